//! User-facing texts
//!
//! Every text the widget shows has a default that depends on whether
//! multiple files may be selected. Hosts localise or rebrand by supplying
//! overrides keyed by field name (`after_upload_success`, `upload_button`, ...).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Resolved set of texts shown by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Labels {
    /// Caption of the file picker button
    pub select_file_button: String,
    /// Caption of the reset button
    pub reset_button: String,
    /// Caption of the upload button
    pub upload_button: String,
    /// Text inside the drop zone
    pub drag_n_drop_box: String,
    /// Caption of the paper-clip trigger in attach-pin mode
    pub attach_pin_button: String,
    /// Shown while an upload is running
    pub please_wait_message: String,
    /// Status message after a successful upload
    pub after_upload_success: String,
    /// Status message after a failed upload
    pub after_upload_error: String,
    /// Prefix for the size limit hint
    pub size_limit: String,
}

impl Labels {
    /// Default texts for single or multiple selection
    #[must_use]
    pub fn defaults(multiple: bool) -> Self {
        Self {
            select_file_button: if multiple { "Select Files" } else { "Select File" }.to_string(),
            reset_button: "Reset".to_string(),
            upload_button: "Upload".to_string(),
            drag_n_drop_box: "Drag N Drop".to_string(),
            attach_pin_button: if multiple {
                "Attach Files..."
            } else {
                "Attach File..."
            }
            .to_string(),
            please_wait_message: "Please wait until file is uploaded".to_string(),
            after_upload_success: "Successfully Uploaded !".to_string(),
            after_upload_error: "Upload Failed !".to_string(),
            size_limit: "Size Limit".to_string(),
        }
    }

    /// Defaults merged with host overrides
    ///
    /// Unknown keys are logged and ignored.
    #[must_use]
    pub fn resolve(multiple: bool, overrides: &BTreeMap<String, String>) -> Self {
        let mut labels = Self::defaults(multiple);
        for (key, value) in overrides {
            if let Some(slot) = labels.slot_mut(key) {
                slot.clone_from(value);
            } else {
                warn!(key = %key, "Ignoring unknown label override");
            }
        }
        labels
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut String> {
        let slot = match key {
            "select_file_button" => &mut self.select_file_button,
            "reset_button" => &mut self.reset_button,
            "upload_button" => &mut self.upload_button,
            "drag_n_drop_box" => &mut self.drag_n_drop_box,
            "attach_pin_button" => &mut self.attach_pin_button,
            "please_wait_message" => &mut self.please_wait_message,
            "after_upload_success" => &mut self.after_upload_success,
            "after_upload_error" => &mut self.after_upload_error,
            "size_limit" => &mut self.size_limit,
            _ => return None,
        };
        Some(slot)
    }
}
