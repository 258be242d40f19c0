//! Herb lore and illustration lookup through a content generation service.
//!
//! The service itself sits behind [`HerbOracle`]; this module owns the prompts, validates the
//! lore payload and turns generated image bytes into a `data:` reference.

use std::fmt;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{debug, info, warn};

use crate::model::HerbRecord;
use crate::state::{Action, AppState, Changes, StateError};

/// MIME type requested for generated illustrations.
pub const IMAGE_MIME_TYPE: &str = "image/jpeg";

/// Errors raised by a lookup.
#[derive(Debug)]
pub enum OracleError {
    /// The search query is blank.
    EmptyQuery,
    /// The service answered with no text.
    EmptyResponse,
    /// The lore payload is not the expected JSON object.
    InvalidResponse(serde_json::Error),
    /// The service returned no image.
    NoImage,
    /// The service could not be reached or refused the request.
    Service(String),
    /// Fetching the lore for `herb` failed.
    Lore { herb: String, source: Box<OracleError> },
    /// Generating the illustration for `herb` failed.
    Image { herb: String, source: Box<OracleError> },
}

impl OracleError {
    /// The message shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyQuery => "Please enter the name of an herb.".to_string(),
            Self::Lore { herb, .. } => format!(
                "Failed to fetch information for \"{}\". The plant may be too obscure or the request failed.",
                herb
            ),
            Self::Image { herb, .. } => format!("Failed to generate an image for \"{}\".", herb),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyQuery => write!(f, "The search query is empty"),
            Self::EmptyResponse => write!(f, "Received an empty response from the AI."),
            Self::InvalidResponse(err) => write!(f, "The lore response is not valid JSON: {}", err),
            Self::NoImage => write!(f, "No image was generated."),
            Self::Service(reason) => write!(f, "The content service failed: {}", reason),
            Self::Lore { herb, source } => {
                write!(f, "Failed to fetch lore for \"{}\": {}", herb, source)
            }
            Self::Image { herb, source } => {
                write!(f, "Failed to generate an image for \"{}\": {}", herb, source)
            }
        }
    }
}

impl std::error::Error for OracleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidResponse(err) => Some(err),
            Self::Lore { source, .. } | Self::Image { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for OracleError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err)
    }
}

/// Encoded bytes of a generated illustration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// A content generation service.
#[async_trait]
pub trait HerbOracle: Send + Sync {
    /// Answers a lore prompt with the raw JSON text of a herb record.
    async fn fetch_lore(&self, prompt: &str) -> Result<String, OracleError>;

    /// Answers an image prompt with one illustration.
    async fn fetch_image(&self, prompt: &str) -> Result<GeneratedImage, OracleError>;
}

pub fn lore_prompt(herb_name: &str) -> String {
    format!(
        "You are an expert herbalist specializing in esoteric and magical lore. Provide the magical \
         significance of the herb \"{}\". Do not include any introductory or concluding phrases, \
         just the JSON object.",
        herb_name
    )
}

pub fn image_prompt(herb_name: &str) -> String {
    format!(
        "A mystical, artistic digital painting of the {} plant. The plant has a subtle, magical \
         glow. The background is dark and esoteric, with faint, glowing alchemical symbols. \
         Fantasy art style, high detail, cinematic lighting.",
        herb_name
    )
}

/// Parses the lore payload; an empty answer and malformed JSON are distinct errors.
pub fn parse_lore_response(text: &str) -> Result<HerbRecord, OracleError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(OracleError::EmptyResponse);
    }
    Ok(serde_json::from_str(text)?)
}

pub fn image_data_uri(image: &GeneratedImage) -> String {
    format!("data:{};base64,{}", image.mime_type, BASE64.encode(&image.bytes))
}

/// A successful lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HerbFound {
    pub herb: HerbRecord,
    /// `data:` reference of the illustration.
    pub image: String,
}

/// Requests lore and illustration together; succeeds only when both do.
pub async fn search_herb(oracle: &dyn HerbOracle, query: &str) -> Result<HerbFound, OracleError> {
    let herb_name = query.trim();
    if herb_name.is_empty() {
        return Err(OracleError::EmptyQuery);
    }
    info!("Searching for \"{}\"", herb_name);

    let (lore_request, image_request) = (lore_prompt(herb_name), image_prompt(herb_name));
    let lore = async {
        let text = oracle.fetch_lore(&lore_request).await?;
        parse_lore_response(&text)
    };
    let (lore, image) = tokio::join!(lore, oracle.fetch_image(&image_request));

    let herb = lore.map_err(|source| OracleError::Lore {
        herb: herb_name.to_string(),
        source: Box::new(source),
    })?;
    let image = image.map_err(|source| OracleError::Image {
        herb: herb_name.to_string(),
        source: Box::new(source),
    })?;
    if image.bytes.is_empty() {
        return Err(OracleError::Image {
            herb: herb_name.to_string(),
            source: Box::new(OracleError::NoImage),
        });
    }

    debug!("Found \"{}\" ({} image bytes)", herb.name, image.bytes.len());
    Ok(HerbFound {
        herb,
        image: image_data_uri(&image),
    })
}

/// Runs a search and records its lifecycle in `state`.
///
/// A search started while another is loading is rejected before the service is contacted.
pub async fn run_search(
    state: &mut AppState,
    oracle: &dyn HerbOracle,
    query: &str,
) -> Result<Changes, StateError> {
    let changes = state.dispatch(Action::SearchStarted(query.to_string()))?;
    match search_herb(oracle, query).await {
        Ok(found) => state.dispatch(Action::SearchSucceeded {
            herb: found.herb,
            image: found.image,
        })?,
        Err(err) => {
            warn!("Search for \"{}\" failed: {}", query.trim(), err);
            state.dispatch(Action::SearchFailed(err.user_message()))?
        }
    };
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::state::SearchStatus;

    const SAGE_JSON: &str = r#"{
        "name": "Sage",
        "scientificName": "Salvia officinalis",
        "magicalProperties": ["Wisdom", "Cleansing"],
        "elementalAssociation": "Air",
        "planetaryAssociation": "Jupiter",
        "lore": "Sacred to many.",
        "usage": "Burned to cleanse."
    }"#;

    #[derive(Default)]
    struct FakeOracle {
        lore: Option<&'static str>,
        image: Option<Vec<u8>>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HerbOracle for FakeOracle {
        async fn fetch_lore(&self, prompt: &str) -> Result<String, OracleError> {
            self.prompts.lock().expect("lock").push(prompt.to_string());
            self.lore
                .map(str::to_string)
                .ok_or_else(|| OracleError::Service("offline".into()))
        }

        async fn fetch_image(&self, prompt: &str) -> Result<GeneratedImage, OracleError> {
            self.prompts.lock().expect("lock").push(prompt.to_string());
            self.image
                .clone()
                .map(|bytes| GeneratedImage {
                    bytes,
                    mime_type: IMAGE_MIME_TYPE.to_string(),
                })
                .ok_or_else(|| OracleError::Service("offline".into()))
        }
    }

    fn working() -> FakeOracle {
        FakeOracle {
            lore: Some(SAGE_JSON),
            image: Some(vec![1, 2, 3]),
            ..FakeOracle::default()
        }
    }

    #[test]
    fn empty_and_malformed_lore_are_distinct() {
        assert!(matches!(parse_lore_response("  \n"), Err(OracleError::EmptyResponse)));
        assert!(matches!(
            parse_lore_response("{\"name\": 1}"),
            Err(OracleError::InvalidResponse(_))
        ));

        let herb = parse_lore_response(SAGE_JSON).expect("valid lore");
        assert_eq!(herb.scientific_name, "Salvia officinalis");
        assert_eq!(herb.deity_association, None);
    }

    #[test]
    fn data_uri_embeds_base64_bytes() {
        let image = GeneratedImage {
            bytes: b"hi".to_vec(),
            mime_type: IMAGE_MIME_TYPE.to_string(),
        };
        assert_eq!(image_data_uri(&image), "data:image/jpeg;base64,aGk=");
    }

    #[tokio::test]
    async fn search_combines_lore_and_image() {
        let oracle = working();
        let found = search_herb(&oracle, " Sage ").await.expect("search");

        assert_eq!(found.herb.name, "Sage");
        assert_eq!(found.image, "data:image/jpeg;base64,AQID");
        let prompts = oracle.prompts.lock().expect("lock");
        assert_eq!(prompts.len(), 2);
        assert!(prompts.iter().any(|p| p.contains("the herb \"Sage\"")));
        assert!(prompts.iter().any(|p| p.contains("painting of the Sage plant")));
    }

    #[tokio::test]
    async fn one_failed_call_fails_the_search() {
        let oracle = FakeOracle {
            image: None,
            ..working()
        };
        let err = search_herb(&oracle, "Sage").await.unwrap_err();
        assert_eq!(err.user_message(), "Failed to generate an image for \"Sage\".");

        let oracle = FakeOracle {
            lore: Some(""),
            ..working()
        };
        let err = search_herb(&oracle, "Sage").await.unwrap_err();
        assert!(err.user_message().starts_with("Failed to fetch information for \"Sage\"."));
        assert!(matches!(
            err,
            OracleError::Lore { ref source, .. } if matches!(**source, OracleError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn run_search_records_the_outcome() {
        let mut state = AppState::new();
        let changes = run_search(&mut state, &working(), "Sage").await.expect("search");
        assert!(changes.history);
        assert!(matches!(state.search(), SearchStatus::Found { herb, .. } if herb.name == "Sage"));

        let failing = FakeOracle::default();
        run_search(&mut state, &failing, "Rue").await.expect("search");
        assert!(matches!(
            state.search(),
            SearchStatus::Failed { message } if message.contains("\"Rue\"")
        ));
        assert_eq!(state.history(), ["Rue".to_string(), "Sage".to_string()]);
    }

    #[tokio::test]
    async fn blank_queries_are_rejected() {
        assert!(matches!(search_herb(&working(), "  ").await, Err(OracleError::EmptyQuery)));
    }
}
