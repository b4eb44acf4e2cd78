// SPDX-License-Identifier: CEPL-1.0
//! `tessera.toml`.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tessera_render::RenderSettings;
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    /// FIFO when set, MAILBOX otherwise.
    pub vsync: bool,
    pub debug_view: i32,
    pub point_lights: u32,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            vsync: false,
            debug_view: 0,
            point_lights: 64,
        }
    }
}

impl RenderCfg {
    pub fn settings(&self) -> RenderSettings {
        RenderSettings {
            clear_color: self.clear_color,
            vsync: self.vsync,
            debug_view: self.debug_view,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "tessera".to_owned(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub render: RenderCfg,
    pub window: WindowCfg,
}

fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}

pub fn parse(text: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str(text)
}

/// Reads `path`. A missing file gives the defaults; a malformed one is
/// logged and also gives the defaults.
pub fn load(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match parse(&s) {
            Ok(cfg) => {
                info!("config loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("{}: {e}; using defaults", path.display());
                AppCfg::default()
            }
        },
        Err(_) => AppCfg::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(parse("").unwrap(), AppCfg::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse(
            r#"
            [render]
            vsync = true
            point_lights = 500

            [window]
            title = "demo"
            "#,
        )
        .unwrap();
        assert!(cfg.render.vsync);
        assert_eq!(cfg.render.point_lights, 500);
        assert_eq!(cfg.render.clear_color, default_clear());
        assert_eq!(cfg.window.title, "demo");
        assert_eq!(cfg.window.width, 1280);
    }

    #[test]
    fn settings_carry_over() {
        let cfg = parse("[render]\ndebug_view = 2\nclear_color = [1.0, 0.0, 0.0, 1.0]").unwrap();
        let s = cfg.render.settings();
        assert_eq!(s.debug_view, 2);
        assert_eq!(s.clear_color, [1.0, 0.0, 0.0, 1.0]);
        assert!(!s.vsync);
    }

    #[test]
    fn bad_types_are_errors() {
        assert!(parse("[render]\nvsync = \"yes\"").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = load(Path::new("/nonexistent/tessera.toml"));
        assert_eq!(cfg, AppCfg::default());
    }
}
