use thiserror::Error;
use uuid::Uuid;

use crate::srs::SrsError;

#[derive(Error, Debug)]
pub enum AltitudeError {
    #[error("Transform failed for feature {feature}: {source}")]
    Transform {
        feature: Uuid,
        #[source]
        source: SrsError,
    },

    #[error("Invalid style: {0}")]
    Style(#[from] serde_json::Error),
}
