//! Parsing of the `CNXN` payload: `<side>::<k=v;>*`.

use std::collections::HashSet;

/// The `side` token of a parsed banner, i.e. what kind of peer sent it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Host,
    Device,
    Bootloader,
    Recovery,
    Rescue,
    Sideload,
}

impl Side {
    fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "host" => Side::Host,
            "device" => Side::Device,
            "bootloader" => Side::Bootloader,
            "recovery" => Side::Recovery,
            "rescue" => Side::Rescue,
            "sideload" => Side::Sideload,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Banner {
    pub side: Option<Side>,
    pub product: String,
    pub model: String,
    pub device: String,
    pub features: HashSet<String>,
}

/// Parses a banner string. A banner missing the `::` separator, or with an
/// unrecognised `side`, parses to `None` rather than erroring — callers treat
/// that as grounds to offline the transport rather than crash (see
/// DESIGN.md's resolution of the malformed-banner open question).
pub fn parse(banner: &str) -> Option<Banner> {
    let (side, props) = banner.split_once("::")?;
    let side = Side::from_str(side);

    let mut parsed = Banner { side, ..Banner::default() };

    for entry in props.split(';') {
        let entry = entry.trim_end_matches('\0');
        if entry.is_empty() {
            continue;
        }
        let Some((key, value)) = entry.split_once('=') else { continue };
        match key {
            "ro.product.name" => parsed.product = value.to_string(),
            "ro.product.model" => parsed.model = value.to_string(),
            "ro.product.device" => parsed.device = value.to_string(),
            "features" => {
                parsed.features = value.split(',').filter(|f| !f.is_empty()).map(str::to_string).collect();
            }
            _ => {} // unknown keys are ignored, not rejected
        }
    }

    Some(parsed)
}

/// Serializes a banner back into wire form, for the CNXN response we emit.
pub fn format(side: Side, product: &str, model: &str, device: &str, features: &HashSet<String>) -> String {
    let side_str = match side {
        Side::Host => "host",
        Side::Device => "device",
        Side::Bootloader => "bootloader",
        Side::Recovery => "recovery",
        Side::Rescue => "rescue",
        Side::Sideload => "sideload",
    };

    let mut feature_list: Vec<&str> = features.iter().map(String::as_str).collect();
    feature_list.sort_unstable();

    let mut out = format!("{side_str}::");
    if !product.is_empty() {
        out.push_str(&format!("ro.product.name={product};"));
    }
    if !model.is_empty() {
        out.push_str(&format!("ro.product.model={model};"));
    }
    if !device.is_empty() {
        out.push_str(&format!("ro.product.device={device};"));
    }
    if !feature_list.is_empty() {
        out.push_str(&format!("features={};", feature_list.join(",")));
    }
    out
}
