//! Best-effort device classification from the `User-Agent` header.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Device category of the requesting client.
///
/// A missing or unrecognized user agent classifies as [`DeviceType::Desktop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
	#[default]
	Desktop,
	Mobile,
	Tablet,
	Tv,
	Bot,
}

impl DeviceType {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Desktop => "desktop",
			Self::Mobile => "mobile",
			Self::Tablet => "tablet",
			Self::Tv => "tv",
			Self::Bot => "bot",
		}
	}
}

impl fmt::Display for DeviceType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

fn pattern(re: &str) -> Regex {
	Regex::new(re).unwrap_or_else(|e| panic!("invalid device pattern {re:?}: {e}"))
}

static BOT: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)bot\b|crawler|spider|slurp|facebookexternalhit|headlesschrome|lighthouse|curl/|wget/"));
static TV: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)smart-?tv|googletv|appletv|hbbtv|roku|crkey|aft[bmst]|tizen.+tv|web0?s.+tv"));
static TABLET: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)ipad|tablet|kindle|silk/|playbook|nexus (7|9|10)"));
static MOBILE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)mobi|iphone|ipod|android|blackberry|bb10|opera mini|iemobile|windows phone"));

fn is_android_tablet(ua: &str) -> bool {
	let ua = ua.to_ascii_lowercase();
	ua.contains("android") && !ua.contains("mobile")
}

/// Classifies a user agent string.
pub fn classify(user_agent: Option<&str>) -> DeviceType {
	let Some(ua) = user_agent.map(str::trim).filter(|ua| !ua.is_empty()) else {
		return DeviceType::default();
	};
	if BOT.is_match(ua) {
		DeviceType::Bot
	} else if TV.is_match(ua) {
		DeviceType::Tv
	} else if TABLET.is_match(ua) || is_android_tablet(ua) {
		DeviceType::Tablet
	} else if MOBILE.is_match(ua) {
		DeviceType::Mobile
	} else {
		DeviceType::Desktop
	}
}
