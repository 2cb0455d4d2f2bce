pub mod service;

pub use service::{
    cancel_job, continue_job, get_job, job_report, remove_job, restart_job, start_job,
    wait_for_job, CancelJobResponse, ContinueJobResponse, JobRequest, JobSnapshot, JobStatus,
};
