use bytes::Bytes;

/// A file returned by the provider alongside (or instead of) text.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFile {
    pub media_type: String,
    pub bytes: Bytes,
}

impl ProviderFile {
    pub fn new(media_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }
}

/// Everything an image provider returned for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageResponse {
    pub text: Option<String>,
    pub files: Vec<ProviderFile>,
}

impl ImageResponse {
    /// First file that is an image, if any.
    pub fn first_image(&self) -> Option<&ProviderFile> {
        self.files.iter().find(|file| file.is_image())
    }
}

/// Outcome of a successful generation: a root-relative path to the stored
/// artifact, ready to be used as an image source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub artifact_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_image_skips_other_media() {
        let response = ImageResponse {
            text: Some("Here you go".to_string()),
            files: vec![
                ProviderFile::new("text/plain", "caption"),
                ProviderFile::new("image/png", vec![0x89, b'P', b'N', b'G']),
                ProviderFile::new("image/jpeg", vec![0xff, 0xd8]),
            ],
        };

        let image = response.first_image().unwrap();
        assert_eq!(image.media_type, "image/png");
        assert_eq!(&image.bytes[..], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_no_image_among_files() {
        let response = ImageResponse {
            text: None,
            files: vec![ProviderFile::new("application/json", "{}")],
        };
        assert!(response.first_image().is_none());
        assert!(ImageResponse::default().first_image().is_none());
    }
}
