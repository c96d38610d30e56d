use crate::{session::Session, srs::SpatialReference};

/// What a resolver needs to know about the surroundings of one batch of
/// features. Borrowed for the duration of a single `push`.
#[derive(Debug, Clone, Default)]
pub struct FilterContext<'a> {
    session: Option<&'a Session>,
    srs: Option<SpatialReference>,
}

impl<'a> FilterContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session: &'a Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Spatial reference of the features.
    pub fn with_srs(mut self, srs: SpatialReference) -> Self {
        self.srs = Some(srs);
        self
    }

    pub fn session(&self) -> Option<&'a Session> {
        self.session
    }

    pub fn srs(&self) -> Option<&SpatialReference> {
        self.srs.as_ref()
    }
}
