use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;

use crate::error::TimelineError;

/// Chart display options, parsed once from the JSON options blob.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ChartOptions {
    pub width: u32,
    pub height: u32,
    pub background: String,
    pub line_color: String,
    pub error_color: String,
    pub point_radius: u32,
    /// chrono format string for x-axis labels.
    pub time_format: String,
    pub y_label: String,
    pub x_labels: usize,
    pub y_labels: usize,
    pub font_family: String,
    pub font_size: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 240,
            background: "#ffffff".to_string(),
            line_color: "#edc240".to_string(),
            error_color: "#cc3300".to_string(),
            point_radius: 3,
            time_format: "%H:%M".to_string(),
            y_label: "ms".to_string(),
            x_labels: 8,
            y_labels: 5,
            font_family: "sans-serif".to_string(),
            font_size: 12,
        }
    }
}

impl ChartOptions {
    pub fn from_json(raw: &str) -> Result<Self, TimelineError> {
        let options: ChartOptions = serde_json::from_str(raw)
            .map_err(|e| TimelineError::ChartOptions(format!("Failed to parse options JSON: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), TimelineError> {
        if self.width == 0 || self.height == 0 {
            return Err(TimelineError::ChartOptions(
                "Chart width and height must be non-zero".to_string(),
            ));
        }
        for color in [&self.background, &self.line_color, &self.error_color] {
            parse_hex_color(color)?;
        }
        if StrftimeItems::new(&self.time_format).any(|item| matches!(item, Item::Error)) {
            return Err(TimelineError::ChartOptions(format!(
                "Invalid time format '{}'",
                self.time_format
            )));
        }
        self.point_radius_px()?;
        Ok(())
    }

    pub fn point_radius_px(&self) -> Result<i32, TimelineError> {
        i32::try_from(self.point_radius).map_err(|_| {
            TimelineError::ChartOptions(format!("Point radius {} is too large", self.point_radius))
        })
    }
}

/// Parses `#rgb` or `#rrggbb`.
pub fn parse_hex_color(raw: &str) -> Result<(u8, u8, u8), TimelineError> {
    let invalid = || TimelineError::ChartOptions(format!("Invalid color '{raw}'"));
    let hex = raw.strip_prefix('#').ok_or_else(invalid)?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
    match hex.len() {
        3 => {
            let expand = |i: usize| channel(&hex[i..i + 1].repeat(2));
            Ok((expand(0)?, expand(1)?, expand(2)?))
        }
        6 => Ok((channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
        _ => Err(invalid()),
    }
}
