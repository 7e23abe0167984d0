use serde::Deserialize;

use crate::models::bar::RawBar;

#[derive(Deserialize, Debug)]
pub struct BridgeRate {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub tick_volume: i64,
    #[serde(default)]
    pub spread: Option<i64>,
    #[serde(default)]
    pub real_volume: Option<i64>,
}

impl From<BridgeRate> for RawBar {
    fn from(r: BridgeRate) -> Self {
        RawBar {
            open_time: r.time,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            tick_volume: r.tick_volume,
            spread: r.spread,
            real_volume: r.real_volume,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct RatesResponse {
    #[serde(default)]
    pub rates: Vec<BridgeRate>,
}

#[derive(Deserialize, Debug)]
pub struct SelectResponse {
    pub selected: bool,
}

#[derive(Deserialize, Debug)]
pub struct SessionResponse {
    pub connected: bool,
    #[serde(default)]
    pub terminal: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
