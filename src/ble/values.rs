//! Readable characteristic values rendered from the context.

use core::fmt::Write;

use heapless::String;

use crate::context::{Context, PointerColor};
use crate::location::Location;

/// Build metadata reported through the Info characteristic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildInfo {
    pub date: &'static str,
    pub time: &'static str,
    pub version: &'static str,
    pub git_branch: &'static str,
    pub git_commit: &'static str,
}

impl BuildInfo {
    /// Metadata of this build. Fields the build script could not determine
    /// read "unknown".
    pub const fn current() -> Self {
        Self {
            date: or_unknown(option_env!("MCOMPASS_BUILD_DATE")),
            time: or_unknown(option_env!("MCOMPASS_BUILD_TIME")),
            version: env!("CARGO_PKG_VERSION"),
            git_branch: or_unknown(option_env!("MCOMPASS_GIT_BRANCH")),
            git_commit: or_unknown(option_env!("MCOMPASS_GIT_COMMIT")),
        }
    }
}

const fn or_unknown(value: Option<&'static str>) -> &'static str {
    match value {
        Some(v) => v,
        None => "unknown",
    }
}

/// `"<lat>,<lon>"` with six decimals.
pub fn spawn_location(location: &Location) -> String<32> {
    let mut s = String::new();
    let _ = write!(s, "{:.6},{:.6}", location.latitude, location.longitude);
    s
}

/// `"<south>,<spawn>"` in lowercase hex, the same order writes use.
pub fn color(color: &PointerColor) -> String<16> {
    let mut s = String::new();
    let _ = write!(s, "{:x},{:x}", color.south_color, color.spawn_color);
    s
}

/// Azimuth notification payload (little-endian degrees).
pub fn azimuth(angle: u16) -> [u8; 2] {
    angle.to_le_bytes()
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Copy `value` into a bounded string, dropping characters that would
/// need escaping in JSON and anything past `N` bytes.
fn json_field<const N: usize>(value: &str) -> String<N> {
    let mut out = String::new();
    for c in value.chars() {
        if c == '"' || c == '\\' || c.is_control() {
            continue;
        }
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Info JSON. Every field is a string, booleans as `"1"` / `"0"`.
///
/// Build fields are clipped so the whole document always fits.
pub fn info_json(ctx: &Context, build: &BuildInfo) -> String<256> {
    let mut s = String::new();
    let _ = write!(
        s,
        "{{\"buildDate\":\"{}\",\"buildTime\":\"{}\",\"buildVersion\":\"{}\",\
         \"gitBranch\":\"{}\",\"gpsStatus\":\"{}\",\"model\":\"{}\",\
         \"sensorStatus\":\"{}\",\"gitCommit\":\"{}\"}}",
        json_field::<16>(build.date),
        json_field::<16>(build.time),
        json_field::<24>(build.version),
        json_field::<32>(build.git_branch),
        flag(ctx.gps_detected()),
        flag(ctx.model().requires_gps()),
        flag(ctx.has_sensor()),
        json_field::<40>(build.git_commit),
    );
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Model;

    fn build() -> BuildInfo {
        BuildInfo {
            date: "2024-05-01",
            time: "12:00:00",
            version: "1.2.3",
            git_branch: "main",
            git_commit: "abc1234",
        }
    }

    #[test]
    fn spawn_uses_six_decimals() {
        let s = spawn_location(&Location::new(12.5, -67.25));
        assert_eq!(s.as_str(), "12.500000,-67.250000");
    }

    #[test]
    fn color_is_south_then_spawn() {
        let c = PointerColor {
            south_color: 0xAB,
            spawn_color: 0xFF_00_CD,
        };
        assert_eq!(color(&c).as_str(), "ab,ff00cd");
    }

    #[test]
    fn azimuth_is_little_endian() {
        assert_eq!(azimuth(0x0102), [0x02, 0x01]);
    }

    #[test]
    fn info_json_flags() {
        let mut ctx = Context::new();
        ctx.set_gps_detected(true);
        ctx.set_model(Model::Gps);

        let json = info_json(&ctx, &build());
        assert_eq!(
            json.as_str(),
            "{\"buildDate\":\"2024-05-01\",\"buildTime\":\"12:00:00\",\
             \"buildVersion\":\"1.2.3\",\"gitBranch\":\"main\",\"gpsStatus\":\"1\",\
             \"model\":\"1\",\"sensorStatus\":\"0\",\"gitCommit\":\"abc1234\"}"
        );
    }

    #[test]
    fn long_build_metadata_still_yields_whole_document() {
        let long: &'static str = Box::leak("feature/".repeat(20).into_boxed_str());
        let info = BuildInfo {
            git_branch: long,
            git_commit: "0123456789abcdef0123456789abcdef0123456789abcdef",
            ..build()
        };

        let json = info_json(&Context::new(), &info);
        assert!(json.ends_with("\"}"), "{}", json);
        assert!(json.contains("\"gitBranch\":\"feature/feature/feature/feature/\""));
        assert!(json.contains("\"gitCommit\":\"0123456789abcdef0123456789abcdef01234567\""));
    }

    #[test]
    fn quotes_in_build_metadata_are_dropped() {
        let info = BuildInfo {
            git_branch: "say-\"hi\"\\",
            ..build()
        };
        let json = info_json(&Context::new(), &info);
        assert!(json.contains("\"gitBranch\":\"say-hi\""), "{}", json);
    }

    #[test]
    fn current_build_has_crate_version() {
        assert_eq!(BuildInfo::current().version, env!("CARGO_PKG_VERSION"));
    }
}
