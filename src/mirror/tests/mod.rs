
pub(crate) use super::test_helpers::*;
