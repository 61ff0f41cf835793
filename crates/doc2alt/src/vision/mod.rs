//! Concrete [`crate::generator::VisionClient`] implementations. The trait
//! itself lives in `generator` so the pipeline never depends on a specific
//! provider; this module supplies the one shipped by default.

#[cfg(feature = "vision-client")]
pub mod azure_openai;
