//! Handler for `POST /api/process`.

use std::collections::HashSet;
use std::path::PathBuf;

use axum::extract::{Multipart, State};
use serde::Serialize;
use semi_core::error::CoreError;
use semi_core::job_status::{JobMode, JobStatus};
use semi_core::processing_config::{FormFields, Submission};
use semi_core::types::JobId;
use semi_core::upload::{self, UploadLimits};
use semi_pipeline::probe_image;
use tokio::io::AsyncWriteExt;

use crate::engine::record::urls;
use crate::engine::{NewJob, Workspace};
use crate::error::{AppError, AppResult};
use crate::response::{accepted, Accepted};
use crate::state::AppState;

/// Multipart field carrying uploaded images.
const FILES_FIELD: &str = "files";

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub mode: JobMode,
    pub status_url: String,
    pub cancel_url: String,
    /// Where the bundle will be served once the job is done. Absent for
    /// preview jobs.
    pub download_url: Option<String>,
}

/// POST /api/process
///
/// Stage the uploaded images, validate the configuration fields and queue a
/// job. Returns 202 with the job's URLs; processing happens in the
/// background.
pub async fn submit(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Accepted<SubmitResponse>> {
    state.jobs.check_capacity()?;

    let id = JobId::new();
    let workspace = state
        .jobs
        .allocate_workspace(id)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to create job workspace: {e}")))?;

    let staged = match stage(&workspace, state.jobs.limits().upload(), multipart).await {
        Ok(staged) => staged,
        Err(e) => {
            state.jobs.discard_workspace(&workspace).await;
            return Err(e);
        }
    };

    let (inputs, submission) = staged;
    let view = match state.jobs.submit(NewJob {
        id,
        inputs,
        submission,
        workspace: workspace.clone(),
    }) {
        Ok(view) => view,
        Err(e) => {
            state.jobs.discard_workspace(&workspace).await;
            return Err(e.into());
        }
    };

    Ok(accepted(SubmitResponse {
        job_id: id,
        status: view.status,
        mode: view.mode,
        status_url: urls::status(id),
        cancel_url: urls::cancel(id),
        download_url: (view.mode == JobMode::Normal).then(|| urls::download(id)),
    }))
}

/// Read the multipart body: files are streamed into `input/`, every other
/// field is collected as a configuration value.
async fn stage(
    workspace: &Workspace,
    limits: UploadLimits,
    mut multipart: Multipart,
) -> AppResult<(Vec<PathBuf>, Submission)> {
    let mut fields = FormFields::new();
    let mut inputs = Vec::new();
    let mut used_names = HashSet::new();

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name != FILES_FIELD {
            let value = field.text().await?;
            fields.insert(name, value);
            continue;
        }

        let raw_name = field.file_name().unwrap_or_default().to_string();
        if raw_name.is_empty() {
            // Empty file inputs are submitted as a part without a name.
            continue;
        }

        limits.check_file_count(inputs.len() + 1)?;
        let file_name = upload::sanitize_file_name(&raw_name);
        upload::check_extension(&file_name)?;
        let file_name = upload::unique_file_name(&file_name, &mut used_names);

        let dest = workspace.input_dir.join(&file_name);
        let mut file = tokio::fs::File::create(&dest)
            .await
            .map_err(|e| AppError::InternalError(format!("Failed to stage {file_name}: {e}")))?;

        let mut written: u64 = 0;
        while let Some(chunk) = field.chunk().await? {
            written += chunk.len() as u64;
            limits.check_file_size(&file_name, written)?;
            file.write_all(&chunk)
                .await
                .map_err(|e| AppError::InternalError(format!("Failed to stage {file_name}: {e}")))?;
        }
        file.flush()
            .await
            .map_err(|e| AppError::InternalError(format!("Failed to stage {file_name}: {e}")))?;

        tracing::debug!(file = %file_name, bytes = written, "Upload staged");
        inputs.push(dest);
    }

    if inputs.is_empty() {
        return Err(CoreError::Validation("No image files were uploaded".to_string()).into());
    }

    let submission = Submission::from_form(&fields)?;
    probe_all(inputs.clone()).await?;

    Ok((inputs, submission))
}

/// Check that every staged file decodes as an image header.
async fn probe_all(inputs: Vec<PathBuf>) -> AppResult<()> {
    tokio::task::spawn_blocking(move || {
        for input in &inputs {
            if let Err(e) = probe_image(input) {
                let name = input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                return Err(CoreError::Validation(format!(
                    "File {name} is not a valid image: {e}"
                )));
            }
        }
        Ok(())
    })
    .await
    .map_err(|e| AppError::InternalError(format!("Image probe failed: {e}")))??;
    Ok(())
}
