//! Fixed unit-cost table for metered operations.
//!
//! Pricing-table *business rules* (tiers, promotions) live outside this
//! core; what is fixed here is the flat unit cost charged per metered call,
//! used by the ledger and the daily cap.

use crate::error::GovernorError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A metered operation with a fixed unit cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    /// AI room measurement from a photo.
    AiRoomMeasurement,
    /// AI validation that an uploaded photo is usable for a quote.
    AiPhotoValidation,
    /// AI image generation.
    ImageGeneration,
    /// One chat message completion.
    ChatMessage,
}

impl OperationKind {
    /// Every metered kind, in display order.
    pub const ALL: [Self; 4] = [
        Self::AiRoomMeasurement,
        Self::AiPhotoValidation,
        Self::ImageGeneration,
        Self::ChatMessage,
    ];

    /// Unit cost in USD charged per operation.
    pub const fn unit_cost_usd(self) -> f64 {
        match self {
            Self::AiRoomMeasurement => 0.015,
            Self::AiPhotoValidation => 0.005,
            Self::ImageGeneration => 0.04,
            Self::ChatMessage => 0.002,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AiRoomMeasurement => "AI_ROOM_MEASUREMENT",
            Self::AiPhotoValidation => "AI_PHOTO_VALIDATION",
            Self::ImageGeneration => "IMAGE_GENERATION",
            Self::ChatMessage => "CHAT_MESSAGE",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = GovernorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AI_ROOM_MEASUREMENT" => Ok(Self::AiRoomMeasurement),
            "AI_PHOTO_VALIDATION" => Ok(Self::AiPhotoValidation),
            "IMAGE_GENERATION" => Ok(Self::ImageGeneration),
            "CHAT_MESSAGE" => Ok(Self::ChatMessage),
            other => Err(GovernorError::UnknownOperationKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_costs_match_the_product_table() {
        assert_eq!(OperationKind::AiRoomMeasurement.unit_cost_usd(), 0.015);
        assert_eq!(OperationKind::AiPhotoValidation.unit_cost_usd(), 0.005);
        assert_eq!(OperationKind::ImageGeneration.unit_cost_usd(), 0.04);
        assert_eq!(OperationKind::ChatMessage.unit_cost_usd(), 0.002);
    }

    #[test]
    fn string_round_trip() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_fails_fast() {
        let err = "AI_JUGGLING".parse::<OperationKind>().unwrap_err();
        assert_eq!(err, GovernorError::UnknownOperationKind("AI_JUGGLING".into()));
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&OperationKind::AiRoomMeasurement).unwrap();
        assert_eq!(json, "\"AI_ROOM_MEASUREMENT\"");
        let kind: OperationKind = serde_json::from_str("\"CHAT_MESSAGE\"").unwrap();
        assert_eq!(kind, OperationKind::ChatMessage);
    }
}
