use crate::model::{AssetKind, MediaHint};

const IMAGE_EXTENSIONS: &[(&str, &str)] = &[
    (".jpg", "jpg"),
    ("jpeg", "jpg"),
    (".png", "png"),
    (".gif", "gif"),
    (".webp", "webp"),
];
const VIDEO_EXTENSIONS: &[(&str, &str)] = &[(".mp4", "mp4"), (".webm", "webm"), (".mov", "mov")];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub url: String,
    pub kind: AssetKind,
    pub extension: &'static str,
}

/// Classify a media URL by how it was found on the element.
///
/// A video poster keeps kind `Video` but takes an image extension, since the
/// bytes behind the URL are a still frame.
pub fn classify(url: &str, hint: MediaHint) -> Classified {
    let kind = match hint {
        MediaHint::Image => AssetKind::Image,
        MediaHint::VideoSource | MediaHint::VideoPoster => AssetKind::Video,
    };
    let table = match hint {
        MediaHint::VideoSource => VIDEO_EXTENSIONS,
        MediaHint::Image | MediaHint::VideoPoster => IMAGE_EXTENSIONS,
    };
    Classified {
        url: url.to_string(),
        kind,
        extension: infer_extension(url, table),
    }
}

/// Whether the URL path names an image file; posters stored under videos/ are.
pub fn is_image_path(url: &str) -> bool {
    let path = url_path(url).to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|(marker, _)| path.contains(marker))
}

fn infer_extension(url: &str, table: &[(&str, &'static str)]) -> &'static str {
    let path = url_path(url).to_ascii_lowercase();
    table
        .iter()
        .find(|(marker, _)| path.contains(marker))
        .map(|(_, ext)| *ext)
        .unwrap_or(table[0].1)
}

fn url_path(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_extensions() {
        let c = classify("https://scontent.fbcdn.net/v/t39/123_s600x600.png?stp=dst-jpg", MediaHint::Image);
        assert_eq!(c.kind, AssetKind::Image);
        assert_eq!(c.extension, "png");
        assert_eq!(classify("https://x.fbcdn.net/a.JPEG", MediaHint::Image).extension, "jpg");
        assert_eq!(classify("https://x.fbcdn.net/a.webp", MediaHint::Image).extension, "webp");
        assert_eq!(classify("https://x.fbcdn.net/a", MediaHint::Image).extension, "jpg");
    }

    #[test]
    fn query_string_is_ignored() {
        assert_eq!(classify("https://x.fbcdn.net/a?format=.png", MediaHint::Image).extension, "jpg");
    }

    #[test]
    fn video_extensions() {
        let c = classify("https://video.fbcdn.net/v/clip.webm?x=1", MediaHint::VideoSource);
        assert_eq!(c.kind, AssetKind::Video);
        assert_eq!(c.extension, "webm");
        assert_eq!(classify("https://video.fbcdn.net/v/clip", MediaHint::VideoSource).extension, "mp4");
    }

    #[test]
    fn image_paths() {
        assert!(is_image_path("assets/videos/5.jpg"));
        assert!(is_image_path("https://cdn/x/p.webp?y=1"));
        assert!(!is_image_path("https://cdn/clip.mp4?name=a.jpg"));
    }

    #[test]
    fn poster_is_video_with_image_extension() {
        let c = classify("https://x.fbcdn.net/poster_s600x600.gif", MediaHint::VideoPoster);
        assert_eq!(c.kind, AssetKind::Video);
        assert_eq!(c.extension, "gif");
    }
}
