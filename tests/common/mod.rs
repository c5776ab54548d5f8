//! In-memory `SecretStore` that records every call for assertions.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use vault_bootstrap::store::{SecretMetadata, SecretStore, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Describe(String),
    Create {
        name: String,
        description: String,
        value: String,
    },
    Restore(String),
    Update {
        name: String,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Absent,
    SoftDeleted,
    Active,
}

/// Which call answers with AccessDeniedException.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Describe,
    Create,
    Restore,
    /// Updates succeed `after` times, then every further update is denied.
    Update { after: usize },
}

pub struct RecordingStore {
    state: Mutex<RecordState>,
    value: Mutex<Option<String>>,
    calls: Mutex<Vec<StoreCall>>,
    failure: Option<FailOn>,
}

impl RecordingStore {
    pub fn new(state: RecordState) -> Self {
        Self {
            state: Mutex::new(state),
            value: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            failure: None,
        }
    }

    pub fn failing(mut self, failure: FailOn) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Every describe fails with AccessDeniedException.
    pub fn denying_access() -> Self {
        Self::new(RecordState::Absent).failing(FailOn::Describe)
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn state(&self) -> RecordState {
        *self.state.lock().unwrap()
    }

    pub fn value(&self) -> Option<String> {
        self.value.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Update { value, .. } => Some(value),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn denied(action: &str) -> StoreError {
        StoreError::Service {
            status: 400,
            code: "AccessDeniedException".into(),
            message: format!("not authorized to perform secretsmanager:{}", action),
        }
    }
}

#[async_trait]
impl SecretStore for RecordingStore {
    async fn describe(&self, name: &str) -> Result<SecretMetadata, StoreError> {
        self.record(StoreCall::Describe(name.to_string()));
        if self.failure == Some(FailOn::Describe) {
            return Err(Self::denied("DescribeSecret"));
        }
        match self.state() {
            RecordState::Absent => Err(StoreError::NotFound(format!(
                "Secrets Manager can't find the specified secret: {}",
                name
            ))),
            RecordState::SoftDeleted => Ok(SecretMetadata {
                name: name.to_string(),
                arn: None,
                deleted_date: Some(Utc::now()),
            }),
            RecordState::Active => Ok(SecretMetadata {
                name: name.to_string(),
                arn: None,
                deleted_date: None,
            }),
        }
    }

    async fn create(&self, name: &str, description: &str, value: &str) -> Result<(), StoreError> {
        self.record(StoreCall::Create {
            name: name.to_string(),
            description: description.to_string(),
            value: value.to_string(),
        });
        if self.failure == Some(FailOn::Create) {
            return Err(Self::denied("CreateSecret"));
        }
        *self.state.lock().unwrap() = RecordState::Active;
        *self.value.lock().unwrap() = Some(value.to_string());
        Ok(())
    }

    async fn restore(&self, name: &str) -> Result<(), StoreError> {
        self.record(StoreCall::Restore(name.to_string()));
        if self.failure == Some(FailOn::Restore) {
            return Err(Self::denied("RestoreSecret"));
        }
        *self.state.lock().unwrap() = RecordState::Active;
        Ok(())
    }

    async fn update(&self, name: &str, value: &str) -> Result<(), StoreError> {
        let earlier = self.updates().len();
        self.record(StoreCall::Update {
            name: name.to_string(),
            value: value.to_string(),
        });
        if let Some(FailOn::Update { after }) = self.failure {
            if earlier >= after {
                return Err(Self::denied("UpdateSecret"));
            }
        }
        *self.value.lock().unwrap() = Some(value.to_string());
        Ok(())
    }
}
