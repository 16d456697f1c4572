// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reports and announcements.
//!
//! Any user can file a report; only admins (`role == "admin"` on the user
//! document) can resolve reports or publish announcements.

use crate::db::{collections, new_document_id, DocumentStore};
use crate::error::{AppError, Result};
use crate::models::{Announcement, Report, ReportStatus, User};
use crate::time_utils::now_rfc3339;
use serde::Deserialize;
use serde_json::{Map, Value};
use validator::{Validate, ValidationError};

pub const TARGET_KINDS: &[&str] = &["post", "comment", "user"];
pub const REPORT_KINDS: &[&str] = &["spam", "harassment", "inappropriate", "other"];

fn validate_target_kind(value: &str) -> std::result::Result<(), ValidationError> {
    if TARGET_KINDS.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new("unknown_target_kind"))
    }
}

fn validate_report_kind(value: &str) -> std::result::Result<(), ValidationError> {
    if REPORT_KINDS.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new("unknown_report_kind"))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct FileReportRequest {
    #[validate(custom(function = "validate_target_kind"))]
    pub target_kind: String,
    #[validate(length(min = 1, max = 128))]
    pub target_id: String,
    #[validate(custom(function = "validate_report_kind"))]
    pub kind: String,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveReportRequest {
    /// `resolved` or `dismissed`
    pub status: ReportStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AnnouncementRequest {
    #[validate(length(min = 1, max = 120))]
    pub title: String,
    #[validate(length(min = 1, max = 4000))]
    pub body: String,
}

#[derive(Clone)]
pub struct ModerationService {
    store: DocumentStore,
}

impl ModerationService {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    pub async fn file_report(&self, reporter_id: &str, request: FileReportRequest) -> Result<Report> {
        request.validate()?;
        let report = Report {
            id: new_document_id()?,
            reporter_id: reporter_id.to_string(),
            target_kind: request.target_kind,
            target_id: request.target_id,
            kind: request.kind,
            reason: request.reason.trim().to_string(),
            status: ReportStatus::Open,
            resolved_by: None,
            resolved_at: None,
            created_at: now_rfc3339(),
        };
        self.store.set(collections::REPORTS, &report.id, &report).await?;
        tracing::info!(
            report_id = %report.id,
            target_kind = %report.target_kind,
            kind = %report.kind,
            "Report filed"
        );
        Ok(report)
    }

    /// Close an open report. Admin only.
    pub async fn resolve_report(
        &self,
        admin_id: &str,
        report_id: &str,
        request: ResolveReportRequest,
    ) -> Result<Report> {
        self.require_admin(admin_id).await?;
        if request.status == ReportStatus::Open {
            return Err(AppError::BadRequest(
                "Status must be resolved or dismissed".to_string(),
            ));
        }

        let mut report: Report = self.store.require(collections::REPORTS, report_id).await?;
        if report.status != ReportStatus::Open {
            return Err(AppError::Conflict(format!(
                "Report already {}",
                report.status.as_str()
            )));
        }

        let now = now_rfc3339();
        let mut fields = Map::new();
        fields.insert("status".to_string(), Value::from(request.status.as_str()));
        fields.insert("resolved_by".to_string(), Value::from(admin_id));
        fields.insert("resolved_at".to_string(), Value::from(now.clone()));
        self.store.update(collections::REPORTS, report_id, fields).await?;

        report.status = request.status;
        report.resolved_by = Some(admin_id.to_string());
        report.resolved_at = Some(now);
        tracing::info!(report_id = %report_id, admin_id = %admin_id, status = report.status.as_str(), "Report closed");
        Ok(report)
    }

    /// Publish an announcement. Admin only.
    pub async fn publish_announcement(
        &self,
        admin_id: &str,
        request: AnnouncementRequest,
    ) -> Result<Announcement> {
        self.require_admin(admin_id).await?;
        request.validate()?;

        let announcement = Announcement {
            id: new_document_id()?,
            author_id: admin_id.to_string(),
            title: request.title.trim().to_string(),
            body: request.body,
            created_at: now_rfc3339(),
        };
        self.store
            .set(collections::ANNOUNCEMENTS, &announcement.id, &announcement)
            .await?;
        tracing::info!(announcement_id = %announcement.id, "Announcement published");
        Ok(announcement)
    }

    pub async fn require_admin(&self, user_id: &str) -> Result<User> {
        let user: Option<User> = self.store.get_as(collections::USERS, user_id).await?;
        match user {
            Some(user) if user.is_admin() => Ok(user),
            _ => Err(AppError::Forbidden("Admin access required".to_string())),
        }
    }
}
