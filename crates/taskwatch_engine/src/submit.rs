//! Requests that start server-side work and hand back a task id to track.

use serde::{Deserialize, Serialize};
use taskwatch_core::TaskId;
use taskwatch_logging::{track_info, track_warn};
use url::Url;

use crate::transport::{decode_json, http_status_error};
use crate::{ReqwestTransport, TrackError};

/// What the server said about a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub success: bool,
    pub message: String,
    /// Present when the server started background work.
    pub task_id: Option<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryRequest {
    pub jira_ticket: String,
    pub approver: String,
    pub query_description: String,
}

#[derive(Serialize)]
struct TicketRequest<'a> {
    jira_ticket: &'a str,
}

#[derive(Deserialize)]
struct SubmissionBody {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    task_id: Option<String>,
}

impl From<SubmissionBody> for Submission {
    fn from(body: SubmissionBody) -> Self {
        Self {
            success: body.success,
            message: body.response.or(body.message).unwrap_or_default(),
            task_id: body
                .task_id
                .filter(|id| !id.is_empty())
                .map(TaskId::from),
        }
    }
}

impl ReqwestTransport {
    /// Send a free-form chat message to the agent.
    pub async fn submit_chat(&self, message: &str) -> Result<Submission, TrackError> {
        let url = self.endpoint(&["api", "chat"])?;
        let request = self.client().post(url).form(&[("message", message)]);
        self.submit(request).await
    }

    pub async fn check_jira_status(&self, jira_ticket: &str) -> Result<Submission, TrackError> {
        let url = self.endpoint(&["api", "check-jira-status"])?;
        let request = self.client().post(url).json(&TicketRequest { jira_ticket });
        self.submit(request).await
    }

    pub async fn submit_query(&self, query: &QueryRequest) -> Result<Submission, TrackError> {
        let url = self.endpoint(&["api", "submit-query"])?;
        let request = self.client().post(url).json(query);
        self.submit(request).await
    }

    /// Absolute location of a file produced by a finished task.
    pub fn download_url(&self, filename: &str) -> Result<Url, TrackError> {
        self.endpoint(&["api", "download", filename])
    }

    /// Refusals arrive as non-2xx responses that still carry a message; those are
    /// answers, not transport failures.
    async fn submit(&self, request: reqwest::RequestBuilder) -> Result<Submission, TrackError> {
        let (status, body) = self.exchange(request).await?;
        let submission = if status.is_success() {
            Submission::from(decode_json::<SubmissionBody>(&body)?)
        } else {
            match serde_json::from_slice::<SubmissionBody>(&body) {
                Ok(body) if body.response.is_some() || body.message.is_some() => {
                    track_warn!("Server refused the submission with {status}");
                    Submission {
                        success: false,
                        ..Submission::from(body)
                    }
                }
                _ => return Err(http_status_error(status)),
            }
        };
        if let Some(task_id) = &submission.task_id {
            track_info!("Server started task {task_id}");
        }
        Ok(submission)
    }
}
