use std::sync::Arc;

use crate::admission::AdmissionController;
use crate::identity::IdentitySource;

// app's shared state
pub struct AppState {
    pub admission: Arc<AdmissionController>,
    pub identity: IdentitySource, // how clients are told apart
}

impl AppState {
    pub fn new(admission: Arc<AdmissionController>, identity: IdentitySource) -> Arc<Self> {
        Arc::new(Self {
            admission,
            identity,
        })
    }
}
