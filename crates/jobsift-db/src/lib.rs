pub mod api_log_repository;
pub mod attempt_repository;
pub mod company_repository;
pub mod config;
pub mod database;
pub mod event_repository;
pub mod posting_repository;

pub use api_log_repository::ApiCallLogRepository;
pub use attempt_repository::AttemptRepository;
pub use company_repository::CompanyRepository;
pub use config::DatabaseConfig;
pub use database::Database;
pub use event_repository::EventRepository;
pub use posting_repository::JobPostingRepository;
