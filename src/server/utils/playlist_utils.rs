// line oriented helpers for hls playlists, there is no real parser here on purpose since
// upstream manifests are all over the place and the players tolerate it
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::target_codec::is_proxied_path;
use super::url_resolver::{base_of, resolve, to_proxy_path};

pub const MANIFEST_SIGNATURE: &str = "#EXTM3U";
pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const MANIFEST_CONTENT_TYPES: [&str; 3] = [
    "application/vnd.apple.mpegurl",
    "application/x-mpegurl",
    "audio/mpegurl",
];

const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF";
const MEDIA_TAG: &str = "#EXT-X-MEDIA:";
const KEY_TAG: &str = "#EXT-X-KEY";
const MAP_TAG: &str = "#EXT-X-MAP";
const INF_TAG: &str = "#EXTINF";

static URI_ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"URI="([^"]+)""#).expect("uri regex should compile"));
static BANDWIDTH_ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"BANDWIDTH=(\d+)").expect("bandwidth regex should compile"));

/// whitespace plus any byte order mark, some encoders prefix every playlist with one
fn trim_line(line: &str) -> &str {
    line.trim_matches(|c: char| c.is_whitespace() || c == '\u{FEFF}')
}

/// upstream servers mislabel playlists constantly so either the type or the body can say yes
pub fn is_manifest(body: &str, content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    if MANIFEST_CONTENT_TYPES
        .iter()
        .any(|token| content_type.contains(token))
    {
        return true;
    }
    trim_line(body).starts_with(MANIFEST_SIGNATURE)
}

/// multi variant playlists reference other playlists instead of segments
pub fn is_master(content: &str) -> bool {
    content.contains(STREAM_INF_TAG) || content.contains(MEDIA_TAG)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub bandwidth: u64,
    pub uri: String,
}

/// every stream-inf tag paired with the first uri line after it
pub fn parse_variants(content: &str) -> Vec<Variant> {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut variants = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        if trim_line(lines[i]).starts_with(STREAM_INF_TAG) {
            let bandwidth = BANDWIDTH_ATTRIBUTE
                .captures(lines[i])
                .and_then(|c| c[1].parse::<u64>().ok())
                .unwrap_or(0);

            if let Some((j, uri)) = lines
                .iter()
                .enumerate()
                .skip(i + 1)
                .map(|(j, line)| (j, trim_line(line)))
                .find(|(_, line)| !line.is_empty() && !line.starts_with('#'))
            {
                variants.push(Variant {
                    bandwidth,
                    uri: uri.to_string(),
                });
                i = j;
            }
        }
        i += 1;
    }

    variants
}

/// highest bandwidth wins, ties go to whichever variant was declared later
pub fn select_variant(variants: &[Variant]) -> Option<&Variant> {
    let mut best: Option<&Variant> = None;
    for variant in variants {
        match best {
            Some(current) if variant.bandwidth < current.bandwidth => {}
            _ => best = Some(variant),
        }
    }
    best
}

/// fallback for masters without stream-inf, first line that points at another playlist
pub fn first_nested_manifest(content: &str) -> Option<&str> {
    content
        .split('\n')
        .map(trim_line)
        .find(|line| {
            !line.is_empty()
                && !line.starts_with('#')
                && (line.ends_with(".m3u8") || line.contains(".m3u8?"))
        })
}

fn proxy_reference(base_url: &str, reference: &str) -> String {
    if is_proxied_path(reference) {
        return reference.to_string();
    }
    to_proxy_path(&resolve(base_url, reference))
}

/// swap the quoted URI attribute of a key/map tag for its proxied path
fn rewrite_uri_attribute(line: &str, base_url: &str) -> String {
    URI_ATTRIBUTE
        .replace(line, |caps: &regex::Captures| {
            let proxied = proxy_reference(base_url, &caps[1]);
            debug!("rewriting tag uri: original='{}', proxied='{}'", &caps[1], proxied);
            format!("URI=\"{}\"", proxied)
        })
        .into_owned()
}

/// route every segment, key and init map of a media playlist back through the proxy
///
/// interior blank lines are dropped, a single trailing blank line is kept
pub fn rewrite_media_playlist(url: &str, content: &str) -> String {
    let base_url = base_of(url);
    let lines: Vec<&str> = content.split('\n').collect();
    let last = lines.len().saturating_sub(1);

    let mut output = Vec::with_capacity(lines.len());
    for (i, raw) in lines.iter().enumerate() {
        let line = trim_line(raw);

        if line.is_empty() {
            if i == last {
                output.push(String::new());
            }
            continue;
        }

        if line.starts_with(KEY_TAG) || line.starts_with(MAP_TAG) {
            output.push(rewrite_uri_attribute(line, &base_url));
        } else if line.starts_with(INF_TAG) || line.starts_with('#') {
            output.push(line.to_string());
        } else {
            let proxied = proxy_reference(&base_url, line);
            debug!("rewriting segment: original='{}', proxied='{}'", line, proxied);
            output.push(proxied);
        }
    }

    output.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::utils::target_codec::encode_target;

    #[test]
    fn classifies_by_content_type_alone() {
        assert!(is_manifest("not a playlist", "application/vnd.apple.mpegurl"));
        assert!(is_manifest("", "Application/X-MpegURL; charset=utf-8"));
        assert!(is_manifest("", "audio/mpegurl"));
    }

    #[test]
    fn classifies_by_signature_alone() {
        assert!(is_manifest("\n  #EXTM3U\n#EXT-X-VERSION:3", "text/plain"));
        assert!(is_manifest("#EXTM3U", ""));
        assert!(!is_manifest("<html></html>", "text/html"));
        assert!(!is_manifest("", "video/mp2t"));
    }

    #[test]
    fn detects_master_playlists() {
        assert!(is_master("#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\nb.m3u8"));
        assert!(is_master("#EXTM3U\n#EXT-X-MEDIA:TYPE=AUDIO,URI=\"a.m3u8\""));
        assert!(!is_master("#EXTM3U\n#EXTINF:4,\nseg.ts"));
    }

    #[test]
    fn highest_bandwidth_wins() {
        let master = "#EXTM3U\n\
            #EXT-X-STREAM-INF:BANDWIDTH=800000\nlow.m3u8\n\
            #EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720\nhigh.m3u8\n\
            #EXT-X-STREAM-INF:BANDWIDTH=1200000\nmid.m3u8\n";
        let variants = parse_variants(master);
        assert_eq!(variants.len(), 3);
        assert_eq!(select_variant(&variants).unwrap().uri, "high.m3u8");
    }

    #[test]
    fn equal_bandwidth_prefers_later_variant() {
        let master = "#EXTM3U\n\
            #EXT-X-STREAM-INF:BANDWIDTH=500000\nfirst.m3u8\n\
            #EXT-X-STREAM-INF:BANDWIDTH=500000\nsecond.m3u8\n";
        let variants = parse_variants(master);
        assert_eq!(select_variant(&variants).unwrap().uri, "second.m3u8");
    }

    #[test]
    fn missing_bandwidth_counts_as_zero() {
        let master = "#EXTM3U\n\
            #EXT-X-STREAM-INF:RESOLUTION=640x360\n\n# comment\n  only.m3u8  \n";
        let variants = parse_variants(master);
        assert_eq!(
            variants,
            vec![Variant {
                bandwidth: 0,
                uri: "only.m3u8".into()
            }]
        );
        assert_eq!(select_variant(&variants).unwrap().uri, "only.m3u8");
    }

    #[test]
    fn no_variants_selects_nothing() {
        assert!(select_variant(&parse_variants("#EXTM3U\n#EXT-X-MEDIA:TYPE=AUDIO")).is_none());
    }

    #[test]
    fn finds_first_nested_manifest() {
        let content = "#EXTM3U\n#EXT-X-MEDIA:TYPE=AUDIO\nseg.ts\nsub/a.m3u8?token=1\nb.m3u8\n";
        assert_eq!(first_nested_manifest(content), Some("sub/a.m3u8?token=1"));
        assert_eq!(first_nested_manifest("#EXTM3U\nseg.ts\n"), None);
    }

    #[test]
    fn rewrites_media_playlist() {
        let content = "#EXTM3U\n\
            #EXT-X-TARGETDURATION:4\n\
            #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\",IV=0x1\n\
            #EXT-X-MAP:URI=\"/init.mp4\"\n\
            \n\
            #EXTINF:4.0,\n\
            seg1.ts\n\
            #EXTINF:4.0,\n\
            https://cdn.test/seg2.ts\n";
        let rewritten = rewrite_media_playlist("https://x.test/live/index.m3u8", content);

        let expected = [
            "#EXTM3U".to_string(),
            "#EXT-X-TARGETDURATION:4".to_string(),
            format!(
                "#EXT-X-KEY:METHOD=AES-128,URI=\"{}\",IV=0x1",
                encode_target("https://x.test/live/key.bin")
            ),
            format!("#EXT-X-MAP:URI=\"{}\"", encode_target("https://x.test/init.mp4")),
            "#EXTINF:4.0,".to_string(),
            encode_target("https://x.test/live/seg1.ts"),
            "#EXTINF:4.0,".to_string(),
            encode_target("https://cdn.test/seg2.ts"),
            String::new(),
        ]
        .join("\n");

        assert_eq!(rewritten, expected);
    }

    #[test]
    fn no_trailing_blank_line_when_input_has_none() {
        let rewritten = rewrite_media_playlist("https://x.test/a.m3u8", "#EXTM3U\r\nseg.ts");
        assert_eq!(
            rewritten,
            format!("#EXTM3U\n{}", encode_target("https://x.test/seg.ts"))
        );
    }

    #[test]
    fn byte_order_mark_does_not_hide_the_signature() {
        let body = "\u{FEFF}#EXTM3U\n#EXTINF:4,\nseg.ts\n";
        assert!(is_manifest(body, "text/plain"));

        let rewritten = rewrite_media_playlist("https://x.test/a.m3u8", body);
        assert_eq!(
            rewritten,
            format!(
                "#EXTM3U\n#EXTINF:4,\n{}\n",
                encode_target("https://x.test/seg.ts")
            )
        );
    }

    #[test]
    fn byte_order_mark_before_stream_inf_is_ignored() {
        let master = "\u{FEFF}#EXT-X-STREAM-INF:BANDWIDTH=10\nonly.m3u8\n";
        assert_eq!(select_variant(&parse_variants(master)).unwrap().uri, "only.m3u8");
    }

    #[test]
    fn rewriting_twice_does_not_double_wrap() {
        let url = "https://x.test/live/index.m3u8";
        let content = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"k.key\"\n#EXTINF:4,\nseg1.ts\n";
        let once = rewrite_media_playlist(url, content);
        let twice = rewrite_media_playlist(url, &once);
        assert_eq!(once, twice);
    }
}
