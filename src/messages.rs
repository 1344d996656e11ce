//! Localized rendering of decision reasons.
//!
//! Every locale carries the same set of reason codes. Unknown language tags
//! fall back to English.

use serde::{Deserialize, Deserializer, Serialize};

// ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    En,
    Es,
}

impl Lang {
    /// Parse a language tag, falling back to [`Lang::En`] for anything unknown.
    /// Region suffixes are ignored (`es-MX` is Spanish).
    pub fn from_tag(tag: &str) -> Self {
        let primary = tag.split(['-', '_']).next().unwrap_or_default();
        match primary.trim().to_ascii_lowercase().as_str() {
            "es" => Lang::Es,
            _ => Lang::En,
        }
    }
}

impl<'de> Deserialize<'de> for Lang {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Lang::from_tag(&tag))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Heat,
    Cold,
    HighHum,
    DrySoil,
    LowLight,
    Stable,
    Gathering,
}

/// Render `code` in `lang`, interpolating `value` where the template has one.
pub fn render(code: ReasonCode, value: Option<f64>, lang: Lang) -> String {
    // ---
    let v = value.unwrap_or_default();
    match (lang, code) {
        (Lang::En, ReasonCode::Heat) => format!("🔥 Heat spike forecast ({v:.1}°C)"),
        (Lang::En, ReasonCode::Cold) => format!("❄️ Cold drop forecast ({v:.1}°C)"),
        (Lang::En, ReasonCode::HighHum) => format!("💧 High humidity ({v:.0}%)"),
        (Lang::En, ReasonCode::DrySoil) => "🌵 Drought forecast -> Watering".to_string(),
        (Lang::En, ReasonCode::LowLight) => "💡 Low Light -> Lights ON".to_string(),
        (Lang::En, ReasonCode::Stable) => "✅ Forecast Stable".to_string(),
        (Lang::En, ReasonCode::Gathering) => "Gathering data...".to_string(),

        (Lang::Es, ReasonCode::Heat) => format!("🔥 Calor futuro ({v:.1}°C)"),
        (Lang::Es, ReasonCode::Cold) => format!("❄️ Frío futuro ({v:.1}°C)"),
        (Lang::Es, ReasonCode::HighHum) => format!("💧 Humedad alta ({v:.0}%)"),
        (Lang::Es, ReasonCode::DrySoil) => "🌵 Sequía prevista -> Regando".to_string(),
        (Lang::Es, ReasonCode::LowLight) => "💡 Luz Baja -> Luces ON".to_string(),
        (Lang::Es, ReasonCode::Stable) => "✅ Pronóstico Estable".to_string(),
        (Lang::Es, ReasonCode::Gathering) => "Recopilando datos...".to_string(),
    }
}
