use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;
use mime::Mime;
use serde_json::{json, Value};

use crate::tree::{Entry, StructureFamily};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to encode {key}: {reason}")]
    Encode { key: String, reason: String },
}

/// Serializes an entry's data into one media type.
pub trait Exporter: Send + Sync + Debug {
    fn export(&self, entry: &Entry, data: Bytes) -> Result<Bytes, ExportError>;
}

/// Passes the stored bytes through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawExporter;

impl RawExporter {
    pub const IDENTIFIER: &'static str = "canopy.exporters:raw";
}

impl Exporter for RawExporter {
    fn export(&self, _entry: &Entry, data: Bytes) -> Result<Bytes, ExportError> {
        Ok(data)
    }
}

/// Wraps the entry's description and data in a JSON document. UTF-8
/// data is embedded as a string, anything else as an array of bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonExporter;

impl JsonExporter {
    pub const IDENTIFIER: &'static str = "canopy.exporters:json";
}

impl Exporter for JsonExporter {
    fn export(&self, entry: &Entry, data: Bytes) -> Result<Bytes, ExportError> {
        let data = match std::str::from_utf8(&data) {
            Ok(text) => Value::String(text.to_string()),
            Err(_) => Value::from(data.to_vec()),
        };
        let document = json!({
            "key": entry.key,
            "structure_family": entry.structure_family,
            "metadata": entry.metadata,
            "data": data,
        });
        serde_json::to_vec(&document)
            .map(Bytes::from)
            .map_err(|e| ExportError::Encode {
                key: entry.key.clone(),
                reason: e.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{requested} is not supported for {family}; supported media types: [{}]", supported.join(", "))]
pub struct UnsupportedFormatError {
    pub family: StructureFamily,
    pub requested: String,
    pub supported: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid media type {media_type:?}: {reason}")]
pub struct InvalidMediaTypeError {
    pub media_type: String,
    pub reason: String,
}

/// Parse a concrete media type for registration. Wildcards are ranges,
/// not types, and are refused.
pub fn parse_media_type(media_type: &str) -> Result<Mime, InvalidMediaTypeError> {
    let invalid = |reason: String| InvalidMediaTypeError {
        media_type: media_type.to_string(),
        reason,
    };
    let parsed: Mime = media_type
        .trim()
        .parse()
        .map_err(|e: mime::FromStrError| invalid(e.to_string()))?;
    if parsed.type_() == mime::STAR || parsed.subtype() == mime::STAR {
        return Err(invalid("wildcards are not allowed".into()));
    }
    Ok(parsed)
}

/// Maps (structure family, media type) to exporters and file extensions
/// to media types. Later registrations replace earlier ones.
#[derive(Debug, Clone, Default)]
pub struct MediaTypeRegistry {
    // kept sorted by essence
    exporters: HashMap<StructureFamily, Vec<(Mime, Arc<dyn Exporter>)>>,
    extensions: BTreeMap<String, Mime>,
}

impl MediaTypeRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Raw bytes and JSON for every exportable family, CSV for dataframes.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        let raw: Arc<dyn Exporter> = Arc::new(RawExporter);
        let json: Arc<dyn Exporter> = Arc::new(JsonExporter);
        for family in StructureFamily::EXPORTABLE {
            registry.register(family, mime::APPLICATION_OCTET_STREAM, raw.clone());
            registry.register(family, mime::APPLICATION_JSON, json.clone());
        }
        registry.register(StructureFamily::DataFrame, mime::TEXT_CSV, raw);

        registry.register_extension("bin", mime::APPLICATION_OCTET_STREAM);
        registry.register_extension("json", mime::APPLICATION_JSON);
        registry.register_extension("csv", mime::TEXT_CSV);
        registry
    }

    pub fn register(
        &mut self,
        family: StructureFamily,
        media_type: Mime,
        exporter: Arc<dyn Exporter>,
    ) {
        let registered = self.exporters.entry(family).or_default();
        let position = registered
            .binary_search_by(|(known, _)| known.essence_str().cmp(media_type.essence_str()));
        match position {
            Ok(at) => registered[at] = (media_type, exporter),
            Err(at) => registered.insert(at, (media_type, exporter)),
        }
    }

    pub fn register_extension(&mut self, extension: impl AsRef<str>, media_type: Mime) {
        self.extensions
            .insert(normalize_extension(extension.as_ref()), media_type);
    }

    pub fn exporter_for(
        &self,
        family: StructureFamily,
        media_type: &Mime,
    ) -> Result<(Mime, Arc<dyn Exporter>), UnsupportedFormatError> {
        self.exporters
            .get(&family)
            .and_then(|registered| {
                registered
                    .iter()
                    .find(|(known, _)| known.essence_str() == media_type.essence_str())
            })
            .cloned()
            .ok_or_else(|| self.unsupported(family, media_type.essence_str()))
    }

    /// The media type registered for a file extension.
    pub fn media_type_for(
        &self,
        family: StructureFamily,
        extension: &str,
    ) -> Result<&Mime, UnsupportedFormatError> {
        self.extensions
            .get(&normalize_extension(extension))
            .ok_or_else(|| self.unsupported(family, extension))
    }

    pub fn media_types(&self, family: StructureFamily) -> Vec<String> {
        self.exporters
            .get(&family)
            .map(|registered| {
                registered
                    .iter()
                    .map(|(media_type, _)| media_type.essence_str().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn extensions(&self) -> &BTreeMap<String, Mime> {
        &self.extensions
    }

    /// Pick a media type and exporter for a request.
    ///
    /// An explicit `format` (a media type or a registered file extension)
    /// wins over the `Accept` header; with neither, raw bytes are served.
    pub fn negotiate(
        &self,
        family: StructureFamily,
        format: Option<&str>,
        accept: Option<&str>,
    ) -> Result<(Mime, Arc<dyn Exporter>), UnsupportedFormatError> {
        if let Some(format) = format {
            let media_type = if format.contains('/') {
                parse_media_type(format).map_err(|_| self.unsupported(family, format))?
            } else {
                self.media_type_for(family, format)?.clone()
            };
            return self.exporter_for(family, &media_type);
        }

        let registered = self
            .exporters
            .get(&family)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if let Some(accept) = accept.filter(|a| !a.trim().is_empty()) {
            for range in parse_accept(accept) {
                if let Some((media_type, exporter)) = registered
                    .iter()
                    .find(|(candidate, _)| media_range_matches(&range, candidate))
                {
                    return Ok((media_type.clone(), exporter.clone()));
                }
            }
            return Err(self.unsupported(family, accept));
        }

        registered
            .iter()
            .find(|(media_type, _)| *media_type == mime::APPLICATION_OCTET_STREAM)
            .or_else(|| registered.first())
            .cloned()
            .ok_or_else(|| self.unsupported(family, mime::APPLICATION_OCTET_STREAM.essence_str()))
    }

    fn unsupported(&self, family: StructureFamily, requested: &str) -> UnsupportedFormatError {
        UnsupportedFormatError {
            family,
            requested: requested.to_string(),
            supported: self.media_types(family),
        }
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

/// Media ranges from an `Accept` header, highest quality first. Entries
/// that do not parse are skipped.
fn parse_accept(accept: &str) -> Vec<Mime> {
    let mut ranges: Vec<(f32, usize, Mime)> = accept
        .split(',')
        .enumerate()
        .filter_map(|(position, part)| {
            let range: Mime = part.trim().parse().ok()?;
            let quality = range
                .get_param("q")
                .and_then(|q| q.as_str().parse::<f32>().ok())
                .unwrap_or(1.0);
            (quality > 0.0).then_some((quality, position, range))
        })
        .collect();
    ranges.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
    ranges.into_iter().map(|(_, _, range)| range).collect()
}

fn media_range_matches(range: &Mime, media_type: &Mime) -> bool {
    if range.type_() == mime::STAR {
        return true;
    }
    if range.type_() != media_type.type_() {
        return false;
    }
    range.subtype() == mime::STAR || range.subtype() == media_type.subtype()
}
