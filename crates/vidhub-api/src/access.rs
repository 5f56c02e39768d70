//! Access control: role guards and per-video tenant/visibility checks.
//!
//! Cross-tenant requests answer 404 rather than 403 so callers cannot
//! probe for ids in other organizations.

use crate::auth::models::AuthContext;
use vidhub_core::models::{UserRole, Video, Visibility};
use vidhub_core::AppError;

/// Reject callers whose role is not in the allowed set.
pub fn require_role(ctx: &AuthContext, allowed: &[UserRole]) -> Result<(), AppError> {
    if allowed.contains(&ctx.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Requires one of roles: {}",
            allowed
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}

/// Tenant guard followed by the visibility guard, for read access to a
/// video's bytes or metadata.
pub fn check_read_access(video: &Video, ctx: Option<&AuthContext>) -> Result<(), AppError> {
    if video.visibility == Visibility::Public {
        return Ok(());
    }

    let ctx = ctx.ok_or_else(|| AppError::Unauthorized("Missing access token".to_string()))?;

    if video.organization_id != ctx.organization_id {
        return Err(AppError::NotFound("Video not found".to_string()));
    }

    match video.visibility {
        Visibility::Public => Ok(()),
        Visibility::Organization => Ok(()),
        Visibility::Private => {
            if ctx.subject_id == video.uploaded_by
                || ctx.is_admin()
                || video.allowed_user_ids.contains(&ctx.subject_id)
            {
                Ok(())
            } else {
                Err(AppError::Forbidden(
                    "You do not have access to this video".to_string(),
                ))
            }
        }
    }
}

/// Owner-or-admin check for mutating operations, after the tenant
/// guard has already matched.
pub fn check_modify_access(video: &Video, ctx: &AuthContext) -> Result<(), AppError> {
    if video.organization_id != ctx.organization_id {
        return Err(AppError::NotFound("Video not found".to_string()));
    }
    if ctx.subject_id == video.uploaded_by || ctx.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the uploader or an admin can modify this video".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use vidhub_core::models::{SensitivityReport, VideoStatus};

    fn video(org: Uuid, uploader: Uuid, visibility: Visibility) -> Video {
        Video {
            id: Uuid::new_v4(),
            title: "t".to_string(),
            description: String::new(),
            original_filename: "t.mp4".to_string(),
            storage_key: "videos/k".to_string(),
            file_size: 1,
            format: "mp4".to_string(),
            organization_id: org,
            uploaded_by: uploader,
            visibility,
            allowed_user_ids: Vec::new(),
            status: VideoStatus::Completed,
            processing_progress: 100,
            metadata: None,
            thumbnail_key: None,
            sensitivity: SensitivityReport::default(),
            view_count: 0,
            last_viewed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn ctx(org: Uuid, subject: Uuid, role: UserRole) -> AuthContext {
        AuthContext {
            subject_id: subject,
            role,
            organization_id: org,
        }
    }

    #[test]
    fn role_guard() {
        let c = ctx(Uuid::new_v4(), Uuid::new_v4(), UserRole::Viewer);
        assert!(require_role(&c, &[UserRole::Viewer, UserRole::Admin]).is_ok());
        let err = require_role(&c, &[UserRole::Editor, UserRole::Admin]).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn cross_tenant_read_is_not_found() {
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        let v = video(org_a, Uuid::new_v4(), Visibility::Organization);
        let c = ctx(org_b, Uuid::new_v4(), UserRole::Admin);

        assert!(matches!(
            check_read_access(&v, Some(&c)),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn public_video_needs_no_token() {
        let v = video(Uuid::new_v4(), Uuid::new_v4(), Visibility::Public);
        assert!(check_read_access(&v, None).is_ok());
    }

    #[test]
    fn organization_video_readable_by_any_member() {
        let org = Uuid::new_v4();
        let v = video(org, Uuid::new_v4(), Visibility::Organization);
        let member = ctx(org, Uuid::new_v4(), UserRole::Viewer);
        assert!(check_read_access(&v, Some(&member)).is_ok());
    }

    #[test]
    fn private_video_restricted_within_tenant() {
        let org = Uuid::new_v4();
        let uploader = Uuid::new_v4();
        let mut v = video(org, uploader, Visibility::Private);

        // uploader
        assert!(check_read_access(&v, Some(&ctx(org, uploader, UserRole::Editor))).is_ok());
        // same-tenant admin
        assert!(check_read_access(&v, Some(&ctx(org, Uuid::new_v4(), UserRole::Admin))).is_ok());
        // other member: forbidden, not missing
        let other = ctx(org, Uuid::new_v4(), UserRole::Editor);
        assert!(matches!(
            check_read_access(&v, Some(&other)),
            Err(AppError::Forbidden(_))
        ));
        // unless explicitly allowed
        v.allowed_user_ids.push(other.subject_id);
        assert!(check_read_access(&v, Some(&other)).is_ok());
    }

    #[test]
    fn anonymous_non_public_is_unauthorized() {
        let v = video(Uuid::new_v4(), Uuid::new_v4(), Visibility::Organization);
        assert!(matches!(
            check_read_access(&v, None),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn modify_requires_owner_or_admin() {
        let org = Uuid::new_v4();
        let uploader = Uuid::new_v4();
        let v = video(org, uploader, Visibility::Organization);

        assert!(check_modify_access(&v, &ctx(org, uploader, UserRole::Editor)).is_ok());
        assert!(check_modify_access(&v, &ctx(org, Uuid::new_v4(), UserRole::Admin)).is_ok());
        assert!(matches!(
            check_modify_access(&v, &ctx(org, Uuid::new_v4(), UserRole::Editor)),
            Err(AppError::Forbidden(_))
        ));
        // cross-tenant admin still sees nothing
        assert!(matches!(
            check_modify_access(&v, &ctx(Uuid::new_v4(), Uuid::new_v4(), UserRole::Admin)),
            Err(AppError::NotFound(_))
        ));
    }
}
