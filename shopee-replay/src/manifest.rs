use crate::error::{ReplayError, Result};
use flate2::read::GzDecoder;
use m3u8_rs::Playlist;
use reqwest::Client;
use std::io::Read;
use tracing::{debug, info, warn};
use url::Url;

/// One media chunk referenced by a manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub index: usize,
    pub url: Url,
    /// Seconds, from `#EXTINF`. Zero when the manifest doesn't say.
    pub duration: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub url: Url,
    pub segments: Vec<Segment>,
}

impl Manifest {
    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| f64::from(s.duration)).sum()
    }
}

enum Parsed {
    Media(Manifest),
    Variant(Url),
}

/// Downloads a record's manifest and returns its segments in playback order.
///
/// A master playlist is followed once, to its highest bandwidth variant.
pub async fn fetch_manifest(client: &Client, manifest_url: &str) -> Result<Manifest> {
    let url = Url::parse(manifest_url.trim()).map_err(|e| ReplayError::ManifestParse {
        url: manifest_url.to_string(),
        message: format!("bad manifest url: {e}"),
    })?;

    let body = fetch_body(client, &url).await?;
    match parse_manifest(&body, &url)? {
        Parsed::Media(manifest) => finish(manifest),
        Parsed::Variant(variant) => {
            info!(%variant, "master playlist, following best variant");
            let body = fetch_body(client, &variant).await?;
            match parse_manifest(&body, &variant)? {
                Parsed::Media(manifest) => finish(manifest),
                Parsed::Variant(_) => Err(ReplayError::ManifestParse {
                    url: variant.to_string(),
                    message: "variant points at another master playlist".into(),
                }),
            }
        }
    }
}

fn finish(manifest: Manifest) -> Result<Manifest> {
    if manifest.segments.is_empty() {
        return Err(ReplayError::ManifestParse {
            url: manifest.url.to_string(),
            message: "no video segments found".into(),
        });
    }
    info!(
        segments = manifest.segments.len(),
        duration_secs = manifest.total_duration(),
        "parsed manifest"
    );
    Ok(manifest)
}

async fn fetch_body(client: &Client, url: &Url) -> Result<Vec<u8>> {
    debug!(%url, "fetching manifest");
    let bytes = client
        .get(url.clone())
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|e| ReplayError::network(format!("fetching manifest {url}"), e))?
        .bytes()
        .await
        .map_err(|e| ReplayError::network(format!("reading manifest {url}"), e))?;
    maybe_gunzip(&bytes).map_err(|e| ReplayError::ManifestParse {
        url: url.to_string(),
        message: format!("broken gzip body: {e}"),
    })
}

// some CDN nodes send gzip without saying so, check the magic bytes
fn maybe_gunzip(content: &[u8]) -> std::io::Result<Vec<u8>> {
    if content.len() >= 2 && content[0] == 0x1F && content[1] == 0x8B {
        let mut decoder = GzDecoder::new(content);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        return Ok(decompressed);
    }
    Ok(content.to_vec())
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// a BOM or blank lines ahead of #EXTM3U trip up both the header check and m3u8-rs
fn strip_preamble(body: &[u8]) -> &[u8] {
    let body = body.strip_prefix(UTF8_BOM).unwrap_or(body);
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    &body[start..]
}

fn parse_manifest(body: &[u8], base: &Url) -> Result<Parsed> {
    let resolve = |uri: &str| {
        base.join(uri.trim()).map_err(|e| ReplayError::ManifestParse {
            url: base.to_string(),
            message: format!("bad segment reference '{uri}': {e}"),
        })
    };

    let body = strip_preamble(body);
    let text = String::from_utf8_lossy(body);
    if !text.starts_with("#EXTM3U") {
        // headerless list, one uri per line
        warn!(url = %base, "manifest has no #EXTM3U header, reading it as a plain list");
        let segments = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .enumerate()
            .map(|(index, line)| -> Result<Segment> {
                Ok(Segment {
                    index,
                    url: resolve(line)?,
                    duration: 0.0,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(Parsed::Media(Manifest {
            url: base.clone(),
            segments,
        }));
    }

    match m3u8_rs::parse_playlist_res(body) {
        Ok(Playlist::MediaPlaylist(playlist)) => {
            let segments = playlist
                .segments
                .iter()
                .enumerate()
                .map(|(index, segment)| -> Result<Segment> {
                    Ok(Segment {
                        index,
                        url: resolve(&segment.uri)?,
                        duration: segment.duration,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Parsed::Media(Manifest {
                url: base.clone(),
                segments,
            }))
        }
        Ok(Playlist::MasterPlaylist(playlist)) => {
            let best = playlist
                .variants
                .iter()
                .filter(|v| !v.is_i_frame)
                .max_by_key(|v| v.bandwidth)
                .ok_or_else(|| ReplayError::ManifestParse {
                    url: base.to_string(),
                    message: "master playlist without variants".into(),
                })?;
            Ok(Parsed::Variant(resolve(&best.uri)?))
        }
        Err(_) => Err(ReplayError::ManifestParse {
            url: base.to_string(),
            message: "not a valid HLS playlist".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn base() -> Url {
        Url::parse("https://cdn.example.ph/replay/abc/index.m3u8?token=xyz").unwrap()
    }

    fn media(parsed: Parsed) -> Manifest {
        match parsed {
            Parsed::Media(m) => m,
            Parsed::Variant(v) => panic!("expected media playlist, got variant {v}"),
        }
    }

    #[test]
    fn resolves_relative_and_keeps_absolute() {
        let body = b"#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n\
#EXTINF:6.0,\nsegment_0.ts\n\
#EXTINF:6.0,\n../other/segment_1.ts\n\
#EXTINF:4.5,\nhttps://mirror.example.ph/segment_2.ts\n#EXT-X-ENDLIST\n";
        let manifest = media(parse_manifest(body, &base()).unwrap());
        let urls: Vec<&str> = manifest.segments.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            [
                "https://cdn.example.ph/replay/abc/segment_0.ts",
                "https://cdn.example.ph/replay/other/segment_1.ts",
                "https://mirror.example.ph/segment_2.ts",
            ]
        );
        assert_eq!(
            manifest.segments.iter().map(|s| s.index).collect::<Vec<_>>(),
            [0, 1, 2]
        );
        assert!((manifest.total_duration() - 16.5).abs() < 1e-6);
    }

    #[test]
    fn headerless_list_skips_comments() {
        let body = b"# generated\nsegment_0.ts\n\n  segment_1.ts  \n#EXT-X-ENDLIST\n";
        let manifest = media(parse_manifest(body, &base()).unwrap());
        assert_eq!(manifest.segments.len(), 2);
        assert_eq!(
            manifest.segments[1].url.as_str(),
            "https://cdn.example.ph/replay/abc/segment_1.ts"
        );
    }

    #[test]
    fn leading_blank_lines_and_bom_are_ignored() {
        let playlist = "#EXTM3U\n#EXTINF:2.0,\na.ts\n#EXT-X-ENDLIST\n";
        for body in [
            format!("\n{playlist}").into_bytes(),
            format!("  \r\n\t{playlist}").into_bytes(),
            [UTF8_BOM, playlist.as_bytes()].concat(),
            [UTF8_BOM, &b"\n"[..], playlist.as_bytes()].concat(),
        ] {
            let manifest = media(parse_manifest(&body, &base()).unwrap());
            let urls: Vec<&str> = manifest.segments.iter().map(|s| s.url.as_str()).collect();
            assert_eq!(urls, ["https://cdn.example.ph/replay/abc/a.ts"], "{body:?}");
            assert!((manifest.total_duration() - 2.0).abs() < 1e-6);
        }
    }

    #[test]
    fn master_playlist_picks_highest_bandwidth() {
        let body = b"#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\nlow/index.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720\nhigh/index.m3u8\n";
        match parse_manifest(body, &base()).unwrap() {
            Parsed::Variant(url) => assert_eq!(
                url.as_str(),
                "https://cdn.example.ph/replay/abc/high/index.m3u8"
            ),
            Parsed::Media(_) => panic!("expected a variant"),
        }
    }

    #[test]
    fn empty_playlist_is_a_parse_error() {
        let body = b"#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXT-X-ENDLIST\n";
        let manifest = media(parse_manifest(body, &base()).unwrap());
        let err = finish(manifest).unwrap_err();
        assert_eq!(err.kind(), "manifest_parse");
    }

    #[test]
    fn gzip_bodies_are_inflated() {
        let plain = b"#EXTM3U\n#EXTINF:2.0,\na.ts\n";
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(plain).unwrap();
        let gz = encoder.finish().unwrap();
        assert_eq!(maybe_gunzip(&gz).unwrap(), plain);
        assert_eq!(maybe_gunzip(plain).unwrap(), plain);
    }
}
