//! Personal voice authorization.
//!
//! Unsupported when the speech engine cannot be started at all, denied when
//! the user has withheld consent in the config, authorized otherwise.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::announcer::platform::Authorizer;
use crate::announcer::session::AuthorizationOutcome;
use crate::config::Consent;

pub struct ConsentAuthorizer {
    program: String,
    consent: Consent,
}

impl ConsentAuthorizer {
    pub fn new(program: impl Into<String>, consent: Consent) -> Self {
        Self {
            program: program.into(),
            consent,
        }
    }

    async fn engine_available(&self) -> bool {
        let status = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) => {
                debug!("{} --version exited with {status}", self.program);
                true
            }
            Err(e) => {
                info!("Speech engine {} unavailable: {e}", self.program);
                false
            }
        }
    }
}

#[async_trait]
impl Authorizer for ConsentAuthorizer {
    async fn request_authorization(&self) -> AuthorizationOutcome {
        if !self.engine_available().await {
            return AuthorizationOutcome::Unsupported;
        }
        match self.consent {
            Consent::Allow => AuthorizationOutcome::Authorized,
            Consent::Deny => AuthorizationOutcome::Denied,
        }
    }
}
