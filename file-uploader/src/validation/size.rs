//! Human-readable file sizes

use crate::config::BYTES_PER_MB;

/// Formats a byte count as `"x.xx KB"` or `"x.xx MB"`
///
/// Below 1,024,000 bytes the value is divided by 1024 and shown in KB; from
/// 1,024,000 bytes on it is divided by 1,024,000 and shown in MB. The mixed
/// base matches how the size limit itself is expressed.
///
/// # Examples
///
/// ```rust
/// use file_uploader::validation::format_size;
///
/// assert_eq!(format_size(2048), "2.00 KB");
/// assert_eq!(format_size(1_536_000), "1.50 MB");
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    if bytes < BYTES_PER_MB {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.2} MB", bytes as f64 / BYTES_PER_MB as f64)
    }
}
