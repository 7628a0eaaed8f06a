use common::plot::PALETTE;
use plotters::style::RGBColor;
use serde::{Deserialize, Deserializer};

/// One simulation run, as written by the service simulation monitor. Columns
/// not listed here are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceRecord {
    pub hosts: u32,
    pub keep: String,
    pub queries: u32,
    pub rounds: u32,
    #[serde(deserialize_with = "nan_if_empty")]
    pub prepare_wall_avg: f64,
    #[serde(deserialize_with = "nan_if_empty")]
    pub prepare_wall_max: f64,
    #[serde(deserialize_with = "nan_if_empty")]
    pub authorize_wall_avg: f64,
    #[serde(deserialize_with = "nan_if_empty")]
    pub authorize_wall_max: f64,
    #[serde(deserialize_with = "nan_if_empty")]
    pub sign_deferred_wall_avg: f64,
    #[serde(deserialize_with = "nan_if_empty")]
    pub execute_deferred_wall_avg: f64,
    #[serde(deserialize_with = "nan_if_empty")]
    pub reject_wall_avg: f64,
    #[serde(deserialize_with = "nan_if_empty")]
    pub round_wall_avg: f64,
}

/// Empty timing cells read as NaN and are drawn as missing bars.
fn nan_if_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// A timed step of a simulated round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    SignDeferred,
    ExecuteDeferred,
    Reject,
    Authorize,
    Round,
}

impl Phase {
    /// Components of a round, bottom to top in the stacked chart
    pub const STACKED: [Phase; 5] = [
        Phase::Prepare,
        Phase::SignDeferred,
        Phase::ExecuteDeferred,
        Phase::Reject,
        Phase::Authorize,
    ];
    pub const ALL: [Phase; 6] = [
        Phase::Prepare,
        Phase::SignDeferred,
        Phase::ExecuteDeferred,
        Phase::Reject,
        Phase::Authorize,
        Phase::Round,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Phase::Prepare => "prepare_wall_avg",
            Phase::SignDeferred => "sign_deferred_wall_avg",
            Phase::ExecuteDeferred => "execute_deferred_wall_avg",
            Phase::Reject => "reject_wall_avg",
            Phase::Authorize => "authorize_wall_avg",
            Phase::Round => "round_wall_avg",
        }
    }

    pub fn value(self, record: &ServiceRecord) -> f64 {
        match self {
            Phase::Prepare => record.prepare_wall_avg,
            Phase::SignDeferred => record.sign_deferred_wall_avg,
            Phase::ExecuteDeferred => record.execute_deferred_wall_avg,
            Phase::Reject => record.reject_wall_avg,
            Phase::Authorize => record.authorize_wall_avg,
            Phase::Round => record.round_wall_avg,
        }
    }

    /// Same color for a phase in every chart
    pub fn color(self) -> RGBColor {
        let idx = Phase::ALL.iter().position(|p| *p == self).unwrap_or(0);
        PALETTE[idx]
    }
}
