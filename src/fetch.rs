use crate::error::{PrepError, Result};
use async_once::AsyncOnce;
use lazy_static::lazy_static;
use log::{debug, info};
use reqwest::redirect::Policy;
use std::fs;
use std::path;
use std::time::Duration;

lazy_static! {
    pub static ref REQWEST_CLIENT: AsyncOnce<reqwest::Client> = AsyncOnce::new(async {
        let result = reqwest::Client::builder().redirect(Policy::limited(5)).timeout(Duration::from_secs(900)).build();

        match result {
            Ok(request_client) => request_client,
            Err(e) => panic!("Could not create Reqwest Client: {}", e),
        }
    });
}

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// File name a remote source is cached under: the last path segment, query string removed.
pub fn cache_file_name(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    match without_query.trim_end_matches('/').rsplit('/').next() {
        Some(name) if !name.is_empty() && !name.contains(':') => name.to_string(),
        _ => "download".to_string(),
    }
}

/// Resolves a source to a local file. URLs are downloaded into `cache_dir` unless a file
/// of the same name is already there; local paths must exist.
pub async fn fetch_to_cache(source: &str, cache_dir: &path::Path) -> Result<path::PathBuf> {
    if !is_remote(source) {
        let local = path::PathBuf::from(source);
        if !local.exists() {
            return Err(PrepError::MissingInput(source.to_string()));
        }
        return Ok(local);
    }

    let destination = cache_dir.join(cache_file_name(source));
    if destination.exists() {
        debug!("using cached {:?} for {}", destination, source);
        return Ok(destination);
    }

    fs::create_dir_all(cache_dir)?;
    info!("downloading {} to {:?}", source, destination);
    let request_client = REQWEST_CLIENT.get().await;
    let response = request_client.get(source).send().await?.error_for_status()?;
    let bytes = response.bytes().await?;

    // partial downloads must not satisfy the existence check on the next run
    let partial = destination.with_extension("part");
    fs::write(&partial, &bytes)?;
    fs::rename(&partial, &destination)?;
    info!("downloaded {} bytes", bytes.len());
    Ok(destination)
}

pub async fn fetch_text(url: &str) -> Result<String> {
    debug!("GET {}", url);
    let request_client = REQWEST_CLIENT.get().await;
    let response = request_client.get(url).send().await?.error_for_status()?;
    Ok(response.text().await?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cache_names_come_from_the_last_segment() {
        assert_eq!(
            cache_file_name("https://cog.sanger.ac.uk/cancerrxgene/GDSC_release8.5/GDSC1_fitted_dose_response_27Oct23.csv"),
            "GDSC1_fitted_dose_response_27Oct23.csv"
        );
        assert_eq!(cache_file_name("https://example.org/data/matrix.tsv?version=2"), "matrix.tsv");
        assert_eq!(cache_file_name("https://example.org/"), "example.org");
    }

    #[test]
    fn remote_detection() {
        assert!(is_remote("https://rest.kegg.jp/get/hsa04115"));
        assert!(!is_remote("/data/GDSC2.csv"));
    }

    #[tokio::test]
    async fn local_sources_are_checked_for_existence() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.csv");
        fs::write(&present, "a,b\n1,2\n").unwrap();

        let resolved = fetch_to_cache(present.to_str().unwrap(), dir.path()).await.unwrap();
        assert_eq!(resolved, present);

        let missing = dir.path().join("absent.csv");
        let result = fetch_to_cache(missing.to_str().unwrap(), dir.path()).await;
        assert!(matches!(result, Err(PrepError::MissingInput(_))));
    }
}
