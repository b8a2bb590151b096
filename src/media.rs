use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use uuid::Uuid;

use crate::error::FieldErrors;

pub const RECIPE_IMAGES_DIR: &str = "recipes/images";
pub const AVATARS_DIR: &str = "users/avatars";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }

    /// Sniffs the format from the file signature.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }
}

/// Image bytes decoded from a `data:image/<type>;base64,<payload>` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

/// Decodes an uploaded image, reporting problems against `field`.
pub fn decode_image(field: &str, data: &str) -> Result<DecodedImage, FieldErrors> {
    let invalid = || {
        FieldErrors::single(
            field,
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
        )
    };
    let data = data.trim();
    if data.is_empty() {
        return Err(FieldErrors::single(field, "This field may not be blank."));
    }
    let payload = match data.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest.split_once(',').ok_or_else(invalid)?;
            if !header.starts_with("image/") || !header.ends_with(";base64") {
                return Err(invalid());
            }
            payload
        }
        None => data,
    };
    let bytes = STANDARD.decode(payload.trim()).map_err(|_| invalid())?;
    let format = ImageFormat::detect(&bytes).ok_or_else(invalid)?;
    Ok(DecodedImage { format, bytes })
}

/// Uploaded files on local disk, served by the reverse proxy under `url_prefix`.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    url_prefix: String,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>, url_prefix: &str) -> Self {
        let mut url_prefix = url_prefix.to_string();
        if !url_prefix.starts_with('/') {
            url_prefix.insert(0, '/');
        }
        if !url_prefix.ends_with('/') {
            url_prefix.push('/');
        }
        Self {
            root: root.into(),
            url_prefix,
        }
    }

    /// Writes the image under `dir` with a random name and returns its
    /// path relative to the media root.
    pub fn save(&self, dir: &str, image: &DecodedImage) -> std::io::Result<String> {
        let relative = format!(
            "{}/{}.{}",
            dir,
            Uuid::new_v4().to_simple(),
            image.format.extension()
        );
        let target = self.root.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &image.bytes)?;
        log::info!("stored upload {}", relative);
        Ok(relative)
    }

    /// Removes a stored file; a file that is already gone is not an error.
    pub fn delete(&self, relative: &str) {
        if relative.is_empty() || Path::new(relative).is_absolute() || relative.contains("..") {
            return;
        }
        match fs::remove_file(self.root.join(relative)) {
            Ok(()) => log::info!("removed upload {}", relative),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("could not remove upload {}: {}", relative, err),
        }
    }

    /// Absolute URL of a stored file for a client reached through `origin`
    /// (`scheme://host`).
    pub fn url(&self, origin: &str, relative: &str) -> String {
        format!("{}{}{}", origin.trim_end_matches('/'), self.url_prefix, relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8BQDwAEhQGAhKmMIQAAAABJRU5ErkJggg==";

    #[test]
    fn decodes_data_uri() {
        let image = decode_image("image", &format!("data:image/png;base64,{}", PIXEL_PNG)).unwrap();
        assert_eq!(image.format, ImageFormat::Png);
        assert!(image.bytes.starts_with(b"\x89PNG"));
    }

    #[test]
    fn accepts_bare_base64() {
        let image = decode_image("avatar", PIXEL_PNG).unwrap();
        assert_eq!(image.format.extension(), "png");
    }

    #[test]
    fn rejects_non_images() {
        let text = STANDARD.encode("hello world");
        let err = decode_image("image", &format!("data:image/png;base64,{}", text)).unwrap_err();
        assert!(err.get("image").is_some());

        let err = decode_image("image", "data:text/plain;base64,aGVsbG8=").unwrap_err();
        assert!(err.get("image").is_some());

        let err = decode_image("avatar", "data:image/png;base64,@@@").unwrap_err();
        assert!(err.get("avatar").is_some());
    }

    #[test]
    fn blank_image_is_rejected() {
        let err = decode_image("image", "   ").unwrap_err();
        assert_eq!(err.get("image").unwrap()[0], "This field may not be blank.");
    }

    #[test]
    fn detects_formats() {
        assert_eq!(ImageFormat::detect(&[0xff, 0xd8, 0xff, 0xe0]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::detect(b"GIF89a...."), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::detect(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageFormat::Webp));
        assert_eq!(ImageFormat::detect(b"RIFF"), None);
    }

    #[test]
    fn saves_and_deletes_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MediaStorage::new(dir.path(), "media");
        let image = decode_image("image", PIXEL_PNG).unwrap();

        let relative = storage.save(RECIPE_IMAGES_DIR, &image).unwrap();
        assert!(relative.starts_with("recipes/images/"));
        assert!(relative.ends_with(".png"));
        assert_eq!(fs::read(dir.path().join(&relative)).unwrap(), image.bytes);

        storage.delete(&relative);
        assert!(!dir.path().join(&relative).exists());
        storage.delete(&relative);
    }

    #[test]
    fn builds_absolute_urls() {
        let storage = MediaStorage::new("media", "/media/");
        assert_eq!(
            storage.url("http://foodgram.local", "users/avatars/a.png"),
            "http://foodgram.local/media/users/avatars/a.png"
        );
        let storage = MediaStorage::new("media", "media");
        assert_eq!(storage.url("https://x/", "r.png"), "https://x/media/r.png");
    }
}
