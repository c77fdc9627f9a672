//! Lecture manifest resolution and variant selection.

use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::error::ManifestError;
use super::hls::expand_media_playlist;
use super::variant::{
    ManifestVariant, VariantDto, VariantKind, VariantListDto, VariantSource, preference_order,
};
use crate::catalog::Lecture;
use crate::session::SessionContext;

/// Resolves lecture media manifests over the authenticated API.
#[derive(Debug, Clone)]
pub struct ManifestResolver {
    http: Client,
    base: Url,
}

impl ManifestResolver {
    /// Creates a resolver against an API base URL, reusing the shared client.
    #[must_use]
    pub fn new(http: Client, base: Url) -> Self {
        Self { http, base }
    }

    /// Resolves the best usable variant for a lecture.
    ///
    /// Selection: the variant whose resolution is the largest not exceeding
    /// `quality_pref` (ties broken by highest bitrate); the globally best
    /// variant when no preference is set or when the preference exceeds
    /// everything available. Variants whose segments declare a key-ID the
    /// session does not hold are skipped; if that eliminates every variant
    /// the lecture fails with [`ManifestError::MissingKeys`] before any
    /// bytes are fetched.
    ///
    /// # Errors
    ///
    /// [`ManifestError::NoVariants`] for an empty variant list, plus
    /// network/parse errors with URL context.
    #[instrument(skip(self, lecture, session), fields(media_id = %lecture.media_id))]
    pub async fn resolve(
        &self,
        lecture: &Lecture,
        session: &SessionContext,
        quality_pref: Option<u32>,
    ) -> Result<ManifestVariant, ManifestError> {
        let url = self
            .base
            .join(&format!("api/media/{}/manifest", lecture.media_id))
            .map_err(|_| {
                ManifestError::malformed(self.base.as_str(), "cannot build manifest endpoint")
            })?;

        let list: VariantListDto = self.get_json(url.as_str(), session).await?;
        if list.variants.is_empty() {
            return Err(ManifestError::NoVariants {
                media_id: lecture.media_id.clone(),
            });
        }

        let order = preference_order(&list.variants, quality_pref);
        let mut missing_key_example = None;

        for idx in order {
            let candidate = &list.variants[idx];
            match self.expand_variant(candidate, session).await {
                Ok(variant) => {
                    info!(
                        label = %variant.label,
                        height = variant.height,
                        segments = variant.segment_count(),
                        "selected manifest variant"
                    );
                    return Ok(variant);
                }
                Err(SkipOrFail::Skip { key_id }) => {
                    warn!(
                        label = %candidate.label,
                        key_id = %key_id,
                        "variant needs a content key the session does not hold; trying next"
                    );
                    missing_key_example.get_or_insert(key_id);
                }
                Err(SkipOrFail::Fail(e)) => return Err(e),
            }
        }

        Err(ManifestError::MissingKeys {
            media_id: lecture.media_id.clone(),
            example_key_id: missing_key_example.unwrap_or_default(),
        })
    }

    /// Expands a variant DTO into a full [`ManifestVariant`], verifying
    /// every declared key-ID against the session.
    async fn expand_variant(
        &self,
        dto: &VariantDto,
        session: &SessionContext,
    ) -> Result<ManifestVariant, SkipOrFail> {
        let source = match dto.kind {
            VariantKind::Progressive => VariantSource::Progressive {
                url: dto.url.clone(),
            },
            VariantKind::Hls => {
                let playlist_url = Url::parse(&dto.url)
                    .map_err(|_| {
                        SkipOrFail::Fail(ManifestError::malformed(
                            dto.url.clone(),
                            "unparseable playlist URL",
                        ))
                    })?;
                let body = self.get_bytes(playlist_url.as_str(), session).await?;
                let segments = expand_media_playlist(&body, &playlist_url).map_err(SkipOrFail::Fail)?;

                // Fail fast on missing keys, before any segment download.
                if let Some(key) = segments
                    .iter()
                    .filter_map(|s| s.key.as_ref())
                    .find(|k| !session.has_content_key(&k.key_id))
                {
                    return Err(SkipOrFail::Skip {
                        key_id: key.key_id.clone(),
                    });
                }

                VariantSource::Segmented { segments }
            }
        };

        Ok(ManifestVariant {
            label: dto.label.clone(),
            height: dto.height,
            bitrate: dto.bitrate,
            source,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        session: &SessionContext,
    ) -> Result<T, ManifestError> {
        let response = self.send(url, session).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ManifestError::malformed(url, e.to_string()))
    }

    async fn get_bytes(
        &self,
        url: &str,
        session: &SessionContext,
    ) -> Result<Vec<u8>, SkipOrFail> {
        let response = self.send(url, session).await.map_err(SkipOrFail::Fail)?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SkipOrFail::Fail(ManifestError::network(url, e)))?;
        Ok(bytes.to_vec())
    }

    async fn send(
        &self,
        url: &str,
        session: &SessionContext,
    ) -> Result<reqwest::Response, ManifestError> {
        let mut request = self.http.get(url);
        if let Some(auth) = session.authorization() {
            request = request.header(AUTHORIZATION, auth);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ManifestError::network(url, e))?;

        let status = response.status().as_u16();
        if matches!(status, 401 | 403) {
            return Err(ManifestError::SessionRejected { status });
        }
        if !response.status().is_success() {
            debug!(url, status, "manifest fetch returned error status");
            return Err(ManifestError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }
        Ok(response)
    }
}

/// Internal control flow for variant fallback: skip (missing key) vs. hard
/// failure.
enum SkipOrFail {
    Skip { key_id: String },
    Fail(ManifestError),
}
