//! Capture timestamps and the metadata they are read from.
//!
//! A timestamp enters the system either as a formatted metadata string
//! (`YYYY:MM:DD HH:MM:SS`) or as a filesystem modification time, and is
//! resolved to a single [`NaiveDateTime`] before it is used for bucketing.

use chrono::{DateTime, Local, NaiveDateTime};
use exif::{In, Reader, Tag, Value};
use regex::Regex;
use std::io::{self, BufRead, Seek};
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Layout of timestamps stored in EXIF fields.
pub const METADATA_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

static METADATA_DATETIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}:\d{2}:\d{2} \d{2}:\d{2}:\d{2}$").expect("static pattern is valid")
});

/// A timestamp as it was found, before calendar resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawTimestamp {
    /// A metadata value, expected to read `YYYY:MM:DD HH:MM:SS`.
    Formatted(String),
    /// Seconds and nanoseconds relative to the Unix epoch.
    Epoch { secs: i64, nanos: u32 },
}

/// Errors produced while resolving a [`RawTimestamp`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    /// A formatted value that does not describe a valid calendar time.
    Malformed { value: String },
    /// An epoch value that has no calendar representation.
    OutOfRange { secs: i64 },
}

impl std::fmt::Display for TimestampError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed { value } => write!(
                f,
                "timestamp '{}' does not match YYYY:MM:DD HH:MM:SS",
                value
            ),
            Self::OutOfRange { secs } => {
                write!(f, "epoch time {}s is outside the supported range", secs)
            }
        }
    }
}

impl std::error::Error for TimestampError {}

impl RawTimestamp {
    /// Captures a filesystem time, including times before the epoch.
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Self::Epoch {
                secs: after.as_secs() as i64,
                nanos: after.subsec_nanos(),
            },
            Err(before) => {
                let before = before.duration();
                let mut secs = -(before.as_secs() as i64);
                let mut nanos = before.subsec_nanos();
                if nanos > 0 {
                    secs -= 1;
                    nanos = 1_000_000_000 - nanos;
                }
                Self::Epoch { secs, nanos }
            }
        }
    }

    /// Resolves to a calendar time.
    ///
    /// Formatted values are taken literally. Epoch values are converted to the
    /// local time zone.
    pub fn resolve(&self) -> Result<NaiveDateTime, TimestampError> {
        match self {
            Self::Formatted(value) => {
                let trimmed = value.trim_end_matches(['\0', ' ']);
                if !METADATA_DATETIME_PATTERN.is_match(trimmed) {
                    return Err(TimestampError::Malformed {
                        value: value.clone(),
                    });
                }
                NaiveDateTime::parse_from_str(trimmed, METADATA_DATETIME_FORMAT).map_err(|_| {
                    TimestampError::Malformed {
                        value: value.clone(),
                    }
                })
            }
            Self::Epoch { secs, nanos } => DateTime::from_timestamp(*secs, *nanos)
                .map(|utc| utc.with_timezone(&Local).naive_local())
                .ok_or(TimestampError::OutOfRange { secs: *secs }),
        }
    }
}

/// Metadata fields that can carry a capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureField {
    DateTimeOriginal,
    DateTime,
    DateTimeDigitized,
}

impl CaptureField {
    /// Lookup order: the first field present wins.
    pub const PRIORITY: [CaptureField; 3] = [
        CaptureField::DateTimeOriginal,
        CaptureField::DateTime,
        CaptureField::DateTimeDigitized,
    ];

    pub fn tag(self) -> Tag {
        match self {
            Self::DateTimeOriginal => Tag::DateTimeOriginal,
            Self::DateTime => Tag::DateTime,
            Self::DateTimeDigitized => Tag::DateTimeDigitized,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::DateTimeOriginal => "datetime_original",
            Self::DateTime => "datetime",
            Self::DateTimeDigitized => "datetime_digitized",
        }
    }
}

/// Capture-time fields found in a file's metadata.
///
/// A field that exists with an empty value is still present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureFields {
    pub datetime_original: Option<String>,
    pub datetime: Option<String>,
    pub datetime_digitized: Option<String>,
}

impl CaptureFields {
    pub fn get(&self, field: CaptureField) -> Option<&str> {
        match field {
            CaptureField::DateTimeOriginal => self.datetime_original.as_deref(),
            CaptureField::DateTime => self.datetime.as_deref(),
            CaptureField::DateTimeDigitized => self.datetime_digitized.as_deref(),
        }
    }

    pub fn set(&mut self, field: CaptureField, value: String) {
        let slot = match field {
            CaptureField::DateTimeOriginal => &mut self.datetime_original,
            CaptureField::DateTime => &mut self.datetime,
            CaptureField::DateTimeDigitized => &mut self.datetime_digitized,
        };
        *slot = Some(value);
    }

    /// The value of the highest-priority field that is present.
    pub fn first_present(&self) -> Option<(CaptureField, &str)> {
        CaptureField::PRIORITY
            .into_iter()
            .find_map(|field| self.get(field).map(|value| (field, value)))
    }

    /// The highest-priority field as a raw timestamp.
    pub fn capture_timestamp(&self) -> Option<RawTimestamp> {
        self.first_present()
            .map(|(_, value)| RawTimestamp::Formatted(value.to_string()))
    }
}

/// Errors produced by a [`MetadataReader`].
#[derive(Debug)]
pub enum MetadataError {
    Io(io::Error),
    /// Metadata exists but could not be decoded.
    Malformed(String),
    /// A capture field holds something other than text.
    UnsupportedValue { field: CaptureField },
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read metadata: {}", e),
            Self::Malformed(reason) => write!(f, "malformed metadata: {}", reason),
            Self::UnsupportedValue { field } => {
                write!(f, "metadata field {} is not a text value", field.name())
            }
        }
    }
}

impl std::error::Error for MetadataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MetadataError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Source of embedded capture metadata.
pub trait MetadataReader {
    /// Reads the capture fields from an open file.
    ///
    /// Returns `Ok(None)` when the stream carries no metadata at all.
    fn read_capture_fields<R: BufRead + Seek>(
        &self,
        reader: &mut R,
    ) -> Result<Option<CaptureFields>, MetadataError>;
}

/// Reads capture fields from EXIF data.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifReader;

impl MetadataReader for ExifReader {
    fn read_capture_fields<R: BufRead + Seek>(
        &self,
        reader: &mut R,
    ) -> Result<Option<CaptureFields>, MetadataError> {
        // Files that only carry an image extension are not parsed.
        if !infer::is_image(reader.fill_buf()?) {
            return Ok(None);
        }

        let exif = match Reader::new().read_from_container(reader) {
            Ok(exif) => exif,
            Err(exif::Error::NotFound(_)) => return Ok(None),
            Err(exif::Error::Io(e)) => return Err(MetadataError::Io(e)),
            Err(e) => return Err(MetadataError::Malformed(e.to_string())),
        };

        let mut fields = CaptureFields::default();
        for field in CaptureField::PRIORITY {
            let Some(found) = exif.get_field(field.tag(), In::PRIMARY) else {
                continue;
            };
            let Value::Ascii(ref parts) = found.value else {
                return Err(MetadataError::UnsupportedValue { field });
            };
            let text = parts
                .first()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default();
            fields.set(field, text);
        }
        Ok(Some(fields))
    }
}
