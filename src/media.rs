//! Media URL rewriting, upload presigning and QR rendering.

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::config::{ClipsConfig, MediaConfig};
use crate::error::ServiceError;

/// Content types accepted for clip uploads.
pub const ACCEPTED_CONTENT_TYPES: &[&str] = &["video/mp4", "video/quicktime"];

const PRESIGN_TTL_SECS: i64 = 900;

/// Rewrites media links onto the CDN when one is configured.
///
/// Only links served by us are eligible: relative paths and absolute URLs
/// whose host is the origin host or one of the configured rewrite hosts.
/// Third-party URLs, `data:` and `blob:` payloads pass through untouched.
#[derive(Debug, Clone, Default)]
pub struct MediaUrls {
    cdn_base: Option<String>,
    origin_host: Option<String>,
    rewrite_hosts: Vec<String>,
}

impl MediaUrls {
    /// Build a rewriter from the media configuration.
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            cdn_base: config
                .cdn_base_url
                .as_deref()
                .map(|base| base.trim_end_matches('/').to_string()),
            origin_host: config.origin_base_url.as_deref().and_then(host_of),
            rewrite_hosts: config
                .rewrite_hosts
                .iter()
                .map(|host| host.to_lowercase())
                .collect(),
        }
    }

    /// Rewrite one URL, returning it unchanged when it is not eligible.
    pub fn rewrite(&self, url: &str) -> String {
        let Some(cdn_base) = self.cdn_base.as_deref() else {
            return url.to_string();
        };
        if url.starts_with("data:") || url.starts_with("blob:") {
            return url.to_string();
        }
        if url.starts_with('/') {
            return format!("{cdn_base}{url}");
        }
        let Some((host, path)) = split_absolute(url) else {
            return url.to_string();
        };
        let host = host.to_lowercase();
        let eligible = self.origin_host.as_deref() == Some(host.as_str())
            || self.rewrite_hosts.iter().any(|known| known == &host);
        if eligible {
            format!("{cdn_base}{path}")
        } else {
            url.to_string()
        }
    }

    /// Rewrite an optional URL in place.
    pub fn rewrite_opt(&self, url: Option<&str>) -> Option<String> {
        url.map(|url| self.rewrite(url))
    }

    /// Pick a clip's display thumbnail: the explicit one when present,
    /// otherwise a `.jpg` sibling derived from the video URL.
    pub fn resolve_thumb(&self, thumbnail: Option<&str>, video: Option<&str>) -> Option<String> {
        if let Some(thumb) = thumbnail {
            return Some(self.rewrite(thumb));
        }
        let video = video?;
        let derived = match video.rsplit_once('.') {
            Some((stem, _ext)) => format!("{stem}.jpg"),
            None => format!("{video}.jpg"),
        };
        Some(self.rewrite(&derived))
    }
}

/// A presigned upload slot returned to the client.
#[derive(Debug, Clone)]
pub struct PresignedUpload {
    /// Where to PUT the bytes.
    pub url: String,
    /// HTTP method the client must use.
    pub method: &'static str,
    /// Content type the upload must carry.
    pub content_type: String,
    /// RFC 3339 expiry of the slot.
    pub expires_at: String,
}

/// Presign an upload for a clip, validating type and size up front.
pub fn presign_upload(
    media: &MediaConfig,
    clips: &ClipsConfig,
    event_id: &str,
    clip_id: &str,
    content_type: &str,
    size_bytes: u64,
) -> Result<PresignedUpload, ServiceError> {
    let content_type = content_type.trim().to_lowercase();
    if !ACCEPTED_CONTENT_TYPES.contains(&content_type.as_str()) {
        return Err(ServiceError::InvalidInput(format!(
            "unsupported content type: {content_type}"
        )));
    }
    if size_bytes == 0 {
        return Err(ServiceError::InvalidInput("empty upload".into()));
    }
    if size_bytes > clips.max_upload_bytes {
        return Err(ServiceError::PayloadTooLarge(format!(
            "upload of {size_bytes} bytes exceeds the {} byte limit",
            clips.max_upload_bytes
        )));
    }

    let extension = if content_type == "video/quicktime" {
        "mov"
    } else {
        "mp4"
    };
    let path = format!("/uploads/{event_id}/{clip_id}.{extension}");
    let url = match media.uploads_base_url.as_deref() {
        Some(base) => format!("{}{path}", base.trim_end_matches('/')),
        // Local mock target for development runs without object storage.
        None => path,
    };
    let expires_at = (OffsetDateTime::now_utc() + time::Duration::seconds(PRESIGN_TTL_SECS))
        .format(&Rfc3339)
        .map_err(|err| ServiceError::Internal(format!("timestamp format: {err}")))?;

    Ok(PresignedUpload {
        url,
        method: "PUT",
        content_type,
        expires_at,
    })
}

/// Render a join code as a minimal QR-styled SVG placeholder.
///
/// The host console only needs something scannable-looking to display next
/// to the code; a real generator can replace this output transparently.
pub fn qr_svg_placeholder(data: &str) -> String {
    let label: String = data.chars().take(64).collect();
    format!(
        concat!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 120 120\">",
            "<rect width=\"120\" height=\"120\" fill=\"#fff\"/>",
            "<rect x=\"8\" y=\"8\" width=\"28\" height=\"28\" fill=\"#000\"/>",
            "<rect x=\"84\" y=\"8\" width=\"28\" height=\"28\" fill=\"#000\"/>",
            "<rect x=\"8\" y=\"84\" width=\"28\" height=\"28\" fill=\"#000\"/>",
            "<text x=\"60\" y=\"64\" font-family=\"monospace\" font-size=\"10\" ",
            "text-anchor=\"middle\">{}</text>",
            "</svg>"
        ),
        escape_xml(&label)
    )
}

fn escape_xml(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn host_of(url: &str) -> Option<String> {
    split_absolute(url).map(|(host, _)| host.to_lowercase())
}

/// Split an absolute http(s) URL into (host, path-and-after).
fn split_absolute(url: &str) -> Option<(String, String)> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    match rest.find('/') {
        Some(index) => Some((rest[..index].to_string(), rest[index..].to_string())),
        None => Some((rest.to_string(), String::from("/"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media_config() -> MediaConfig {
        MediaConfig {
            cdn_base_url: Some("https://cdn.example.com".into()),
            origin_base_url: Some("https://origin.example.com".into()),
            rewrite_hosts: vec!["media.example.com".into()],
            uploads_base_url: None,
        }
    }

    #[test]
    fn rewrites_origin_and_relative_urls_only() {
        let urls = MediaUrls::new(&media_config());
        assert_eq!(
            urls.rewrite("https://origin.example.com/clips/c1.mp4"),
            "https://cdn.example.com/clips/c1.mp4"
        );
        assert_eq!(
            urls.rewrite("https://media.example.com/clips/c2.mp4"),
            "https://cdn.example.com/clips/c2.mp4"
        );
        assert_eq!(
            urls.rewrite("/clips/c3.mp4"),
            "https://cdn.example.com/clips/c3.mp4"
        );
        assert_eq!(
            urls.rewrite("https://youtube.com/watch?v=x"),
            "https://youtube.com/watch?v=x"
        );
        assert_eq!(urls.rewrite("data:image/png;base64,AAAA"), "data:image/png;base64,AAAA");
    }

    #[test]
    fn no_cdn_means_no_rewriting() {
        let urls = MediaUrls::new(&MediaConfig {
            cdn_base_url: None,
            origin_base_url: Some("https://origin.example.com".into()),
            rewrite_hosts: Vec::new(),
            uploads_base_url: None,
        });
        assert_eq!(urls.rewrite("/clips/c1.mp4"), "/clips/c1.mp4");
    }

    #[test]
    fn thumb_falls_back_to_video_sibling() {
        let urls = MediaUrls::new(&media_config());
        assert_eq!(
            urls.resolve_thumb(None, Some("https://origin.example.com/clips/c1.mp4")),
            Some("https://cdn.example.com/clips/c1.jpg".into())
        );
        assert_eq!(
            urls.resolve_thumb(Some("/thumbs/t1.jpg"), None),
            Some("https://cdn.example.com/thumbs/t1.jpg".into())
        );
        assert_eq!(urls.resolve_thumb(None, None), None);
    }

    #[test]
    fn presign_validates_type_and_size() {
        let clips = crate::config::AppConfig::default().clips;
        let media = media_config();

        let slot = presign_upload(&media, &clips, "e1", "c1", "video/mp4", 1_000).unwrap();
        assert_eq!(slot.method, "PUT");
        assert_eq!(slot.url, "/uploads/e1/c1.mp4");

        let err = presign_upload(&media, &clips, "e1", "c1", "image/png", 1_000).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let err = presign_upload(
            &media,
            &clips,
            "e1",
            "c1",
            "video/mp4",
            clips.max_upload_bytes + 1,
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::PayloadTooLarge(_)));
    }

    #[test]
    fn qr_placeholder_embeds_the_code() {
        let svg = qr_svg_placeholder("ABCDEF2");
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("ABCDEF2"));
    }
}
