//! Session configuration

use crate::error::GgError;
use crate::vdp::{MAX_SPRITES, SPRITE_LIMIT_RANGE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tunables for a Game Gear session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GgConfig {
    /// Sprites kept per line; hardware drops everything past 8, the
    /// default keeps all 64 so games do not flicker
    pub sprite_limit: usize,
    /// CPU cycles between host signal checks in the free-run loop
    pub signal_check_cycles: u32,
}

impl Default for GgConfig {
    fn default() -> Self {
        Self {
            sprite_limit: MAX_SPRITES,
            signal_check_cycles: 33_000,
        }
    }
}

impl GgConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, GgError> {
        let config: GgConfig =
            serde_json::from_str(json).map_err(|e| GgError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, GgError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| GgError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), GgError> {
        if !SPRITE_LIMIT_RANGE.contains(&self.sprite_limit) {
            return Err(GgError::Config(format!(
                "sprite_limit must be within {:?}, got {}",
                SPRITE_LIMIT_RANGE, self.sprite_limit
            )));
        }
        if self.signal_check_cycles == 0 {
            return Err(GgError::Config(
                "signal_check_cycles must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GgConfig::default();
        assert_eq!(config.sprite_limit, 64);
        assert_eq!(config.signal_check_cycles, 33_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = GgConfig::from_json_str(r#"{ "sprite_limit": 8 }"#).unwrap();
        assert_eq!(config.sprite_limit, 8);
        assert_eq!(config.signal_check_cycles, 33_000);
    }

    #[test]
    fn test_sprite_limit_bounds_match_vdp() {
        use crate::vdp::Vdp;
        for limit in [7, 8, 64, 65] {
            let config = GgConfig {
                sprite_limit: limit,
                ..GgConfig::default()
            };
            let accepted = config.validate().is_ok();
            assert_eq!(accepted, Vdp::new(limit).sprite_limit() == limit, "limit {}", limit);
        }
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(matches!(
            GgConfig::from_json_str(r#"{ "sprite_limit": 4 }"#),
            Err(GgError::Config(_))
        ));
        assert!(matches!(
            GgConfig::from_json_str(r#"{ "signal_check_cycles": 0 }"#),
            Err(GgError::Config(_))
        ));
        assert!(matches!(
            GgConfig::from_json_str("not json"),
            Err(GgError::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = GgConfig::load(Path::new("/nonexistent/gg.json"));
        assert!(matches!(result, Err(GgError::Config(_))));
    }
}
