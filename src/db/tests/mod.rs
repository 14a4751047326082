
use crate::types::{DownloadLink, Listing, Song};
use std::collections::BTreeMap;

/// Build a listing with `songs` one-link songs for store tests.
pub(crate) fn sample_listing(url: &str, songs: usize) -> Listing {
    Listing {
        url: url.to_string(),
        songs: (0..songs)
            .map(|i| Song {
                name: format!("Track {}", i + 1),
                page_link: format!("{url}/songs/{}", i + 1),
                downloads: vec![DownloadLink {
                    quality: "320kbps".to_string(),
                    url: format!("https://cdn.example.com/{}/{}.mp3", url, i + 1),
                }],
            })
            .collect(),
        metadata: BTreeMap::new(),
    }
}
