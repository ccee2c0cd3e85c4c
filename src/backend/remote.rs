//! Backend that runs generations as jobs on a remote compute provider.

use super::{BackendResult, ComputeBackend, GenerationInput};
use crate::error::BackendError;
use crate::remote::{RemoteClientConfig, RemoteJobClient, REMOTE_BACKEND_NAME};
use async_trait::async_trait;

pub struct RemoteJobBackend {
    client: RemoteJobClient,
}

impl RemoteJobBackend {
    pub fn new(client: RemoteJobClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: RemoteClientConfig) -> Result<Self, BackendError> {
        Ok(Self::new(RemoteJobClient::new(config)?))
    }
}

#[async_trait]
impl ComputeBackend for RemoteJobBackend {
    fn name(&self) -> &str {
        REMOTE_BACKEND_NAME
    }

    async fn generate(&self, input: &GenerationInput) -> BackendResult {
        if input.cancel.is_cancelled() {
            return BackendResult::failure(REMOTE_BACKEND_NAME, BackendError::Cancelled);
        }
        let job = match self
            .client
            .submit(&input.image, &input.task_id, &input.parameters)
            .await
        {
            Ok(job) => job,
            Err(e) => return BackendResult::failure(REMOTE_BACKEND_NAME, e),
        };
        self.client.await_completion(job, &input.cancel).await
    }
}
