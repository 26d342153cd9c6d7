use crate::config::ImageDeliveryConfig;
use crate::SearchError;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Auto,
    Webp,
    Avif,
}

impl ImageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Webp => "webp",
            Self::Avif => "avif",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFit {
    #[default]
    Cover,
    Contain,
    Fill,
}

impl ImageFit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cover => "cover",
            Self::Contain => "contain",
            Self::Fill => "fill",
        }
    }
}

/// Resize hints set on an image URL. Unset fields are omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<u8>,
    pub format: Option<ImageFormat>,
    pub fit: Option<ImageFit>,
}

impl ImageOptions {
    pub fn width(width: u32) -> Self {
        Self {
            width: Some(width),
            ..Self::default()
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(width) = self.width {
            params.push(("width", width.to_string()));
        }
        if let Some(height) = self.height {
            params.push(("height", height.to_string()));
        }
        if let Some(quality) = self.quality {
            params.push(("quality", quality.to_string()));
        }
        if let Some(format) = self.format {
            params.push(("format", format.as_str().to_string()));
        }
        if let Some(fit) = self.fit {
            params.push(("fit", fit.as_str().to_string()));
        }
        params
    }
}

/// Builds a delivery URL for `image`.
///
/// Absolute http(s) URLs keep their location and only gain the resize
/// parameters. Anything else is treated as an image id served from the
/// configured delivery base under `variant`.
pub fn optimized_image_url(
    config: &ImageDeliveryConfig,
    image: &str,
    variant: &str,
    options: &ImageOptions,
) -> Result<String, SearchError> {
    let image = image.trim();
    if image.is_empty() {
        return Err(SearchError::InvalidArgument("image id is empty".to_string()));
    }

    let mut url = if image.starts_with("http://") || image.starts_with("https://") {
        Url::parse(image)?
    } else {
        let base = config.delivery_base.trim_end_matches('/');
        let variant = variant.trim_matches('/');
        Url::parse(&format!("{base}/{}/{variant}", image.trim_matches('/')))?
    };

    let params = options.params();
    if !params.is_empty() {
        let merged = merge_params(&url, params);
        url.query_pairs_mut().clear().extend_pairs(merged);
    }
    Ok(url.into())
}

/// Sets each param on the existing query: a key already present keeps its
/// position and takes the new value, later duplicates are dropped, and new
/// keys go at the end.
fn merge_params(url: &Url, params: Vec<(&'static str, String)>) -> Vec<(String, String)> {
    let keys: Vec<&'static str> = params.iter().map(|(name, _)| *name).collect();
    let mut pending = params;
    let mut merged = Vec::new();

    for (key, value) in url.query_pairs() {
        if let Some(index) = pending.iter().position(|(name, _)| *name == key) {
            let (name, value) = pending.remove(index);
            merged.push((name.to_string(), value));
        } else if !keys.contains(&&*key) {
            merged.push((key.into_owned(), value.into_owned()));
        }
    }

    merged.extend(pending.into_iter().map(|(name, value)| (name.to_string(), value)));
    merged
}

/// `srcset` attribute value with one candidate per width.
pub fn srcset(
    config: &ImageDeliveryConfig,
    image: &str,
    widths: &[u32],
    options: &ImageOptions,
) -> Result<String, SearchError> {
    let candidates = widths
        .iter()
        .map(|&width| {
            let sized = ImageOptions {
                width: Some(width),
                ..*options
            };
            optimized_image_url(config, image, "responsive", &sized).map(|url| format!("{url} {width}w"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(candidates.join(", "))
}
