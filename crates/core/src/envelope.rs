//! Queue wire format shared by the producer and the consumer.
//!
//! A queue message value is a JSON-encoded [`CorrelationEnvelope`]:
//!
//! ```text
//! { "version": 1, "destination": "<channel id>", "payload": "<base64 bytes>" }
//! ```
//!
//! The payload bytes are themselves a JSON-encoded [`GenerationResult`]
//! (`{"candidates":[{"content":{"parts":["..."]}}]}`). Absent or `null`
//! arrays decode as empty.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Current envelope schema version. Envelopes written without a version
/// field are read as this version.
pub const SCHEMA_VERSION: u16 = 1;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("destination must not be empty")]
    EmptyDestination,
    #[error("could not encode generation result: {0}")]
    EncodePayload(String),
    #[error("could not encode envelope: {0}")]
    EncodeEnvelope(String),
    #[error("could not decode envelope: {0}")]
    DecodeEnvelope(String),
    #[error("could not decode generation result: {0}")]
    DecodePayload(String),
    #[error("unsupported envelope schema version {0}")]
    UnsupportedVersion(u16),
}

/// Chat channel or conversation a reply is addressed to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Destination(String);

impl Destination {
    pub fn new(value: impl Into<String>) -> Result<Self, EnvelopeError> {
        let value = value.into();
        if value.is_empty() {
            return Err(EnvelopeError::EmptyDestination);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Destination {
    type Error = EnvelopeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Destination> for String {
    fn from(value: Destination) -> Self {
        value.0
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub candidates: Vec<Candidate>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: CandidateContent,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateContent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub parts: Vec<String>,
}

impl GenerationResult {
    pub fn from_candidates<C, P>(candidates: C) -> Self
    where
        C: IntoIterator<Item = P>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            candidates: candidates
                .into_iter()
                .map(|parts| Candidate {
                    content: CandidateContent { parts: parts.into_iter().map(Into::into).collect() },
                })
                .collect(),
        }
    }

    /// Text parts in delivery order: candidate order, then part order.
    pub fn text_fragments(&self) -> impl Iterator<Item = &str> + '_ {
        self.candidates
            .iter()
            .flat_map(|candidate| candidate.content.parts.iter().map(String::as_str))
    }

    pub fn fragment_count(&self) -> usize {
        self.candidates.iter().map(|candidate| candidate.content.parts.len()).sum()
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|error| EnvelopeError::EncodePayload(error.to_string()))
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(payload)
            .map_err(|error| EnvelopeError::DecodePayload(error.to_string()))
    }
}

/// The unit stored in the queue. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationEnvelope {
    #[serde(default = "current_version")]
    version: u16,
    destination: Destination,
    #[serde(serialize_with = "encode_base64", deserialize_with = "decode_base64")]
    payload: Vec<u8>,
}

impl CorrelationEnvelope {
    pub fn new(destination: Destination, payload: Vec<u8>) -> Self {
        Self { version: SCHEMA_VERSION, destination, payload }
    }

    /// Encodes `result` into the payload and pairs it with `destination`.
    pub fn seal(destination: Destination, result: &GenerationResult) -> Result<Self, EnvelopeError> {
        Ok(Self::new(destination, result.to_payload()?))
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn open(&self) -> Result<GenerationResult, EnvelopeError> {
        GenerationResult::from_payload(&self.payload)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|error| EnvelopeError::EncodeEnvelope(error.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: Self = serde_json::from_slice(bytes)
            .map_err(|error| EnvelopeError::DecodeEnvelope(error.to_string()))?;
        if envelope.version != SCHEMA_VERSION {
            return Err(EnvelopeError::UnsupportedVersion(envelope.version));
        }
        Ok(envelope)
    }
}

fn current_version() -> u16 {
    SCHEMA_VERSION
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn encode_base64<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&STANDARD.encode(bytes))
}

fn decode_base64<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded = String::deserialize(deserializer)?;
    STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
}
