//! services/api/src/web/members.rs
//!
//! Membership plans and member profiles.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::state::AppState;
use crate::web::{ErrorBody, ErrorResponse};
use circulation_core::domain::{
    MemberProfile, MembershipPlan, NewMembershipPlan, Principal,
};

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct PlanDto {
    pub id: Uuid,
    pub name: String,
    pub max_books_allowed: i32,
    pub fine_per_day: f64,
    pub duration_days: i32,
    pub annual_fee: f64,
}

impl From<MembershipPlan> for PlanDto {
    fn from(plan: MembershipPlan) -> Self {
        Self {
            id: plan.id,
            name: plan.name,
            max_books_allowed: plan.max_books_allowed,
            fine_per_day: plan.fine_per_day,
            duration_days: plan.duration_days,
            annual_fee: plan.annual_fee,
        }
    }
}

/// Payload shared by plan creation and update.
#[derive(Deserialize, ToSchema)]
pub struct PlanPayload {
    pub name: String,
    pub max_books_allowed: i32,
    pub fine_per_day: f64,
    pub duration_days: i32,
    pub annual_fee: f64,
}

impl PlanPayload {
    fn validate(&self) -> Result<(), ErrorResponse> {
        if self.name.trim().is_empty() {
            return Err(ErrorResponse::bad_request("plan name is required"));
        }
        if self.max_books_allowed < 1 {
            return Err(ErrorResponse::bad_request(
                "a plan must allow at least one book",
            ));
        }
        if self.fine_per_day < 0.0 || self.annual_fee < 0.0 {
            return Err(ErrorResponse::bad_request(
                "fees and fines cannot be negative",
            ));
        }
        if self.duration_days < 1 {
            return Err(ErrorResponse::bad_request(
                "plan duration must be at least one day",
            ));
        }
        Ok(())
    }
}

#[derive(Serialize, ToSchema)]
pub struct MemberDto {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub membership_plan_id: Option<Uuid>,
    /// Resolved from the plan table by id; absent for members without a plan.
    pub plan_name: Option<String>,
    pub membership_start_date: Option<DateTime<Utc>>,
    pub membership_expiry_date: Option<DateTime<Utc>>,
}

impl MemberDto {
    fn from_profile(profile: MemberProfile, plan_name: Option<String>) -> Self {
        Self {
            id: profile.id,
            email: profile.email,
            full_name: profile.full_name,
            phone: profile.phone,
            address: profile.address,
            membership_plan_id: profile.membership_plan_id,
            plan_name,
            membership_start_date: profile.membership_start_date,
            membership_expiry_date: profile.membership_expiry_date,
        }
    }
}

fn require_staff(principal: &Principal) -> Result<(), ErrorResponse> {
    if principal.is_staff() {
        Ok(())
    } else {
        Err(ErrorResponse::forbidden("Forbidden: Staff access required"))
    }
}

fn require_admin(principal: &Principal) -> Result<(), ErrorResponse> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(ErrorResponse::forbidden("Forbidden: Admin access required"))
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// List membership plans.
#[utoipa::path(
    get,
    path = "/plans",
    responses((status = 200, description = "All plans", body = [PlanDto]))
)]
pub async fn list_plans_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let plans = state.store.list_plans().await?;
    Ok(Json(
        plans.into_iter().map(PlanDto::from).collect::<Vec<_>>(),
    ))
}

/// Create a membership plan.
#[utoipa::path(
    post,
    path = "/plans",
    request_body = PlanPayload,
    responses(
        (status = 201, description = "Plan created", body = PlanDto),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 403, description = "Caller is not an admin", body = ErrorBody)
    )
)]
pub async fn create_plan_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<PlanPayload>,
) -> Result<impl IntoResponse, ErrorResponse> {
    require_admin(&principal)?;
    req.validate()?;
    let plan = state
        .store
        .create_plan(NewMembershipPlan {
            name: req.name.trim().to_string(),
            max_books_allowed: req.max_books_allowed,
            fine_per_day: req.fine_per_day,
            duration_days: req.duration_days,
            annual_fee: req.annual_fee,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(PlanDto::from(plan))))
}

/// Update a membership plan.
#[utoipa::path(
    put,
    path = "/plans/{id}",
    request_body = PlanPayload,
    params(("id" = Uuid, Path, description = "Plan id")),
    responses(
        (status = 200, description = "Plan updated", body = PlanDto),
        (status = 404, description = "No such plan", body = ErrorBody)
    )
)]
pub async fn update_plan_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(req): Json<PlanPayload>,
) -> Result<impl IntoResponse, ErrorResponse> {
    require_admin(&principal)?;
    req.validate()?;
    let plan = state
        .store
        .update_plan(MembershipPlan {
            id,
            name: req.name.trim().to_string(),
            max_books_allowed: req.max_books_allowed,
            fine_per_day: req.fine_per_day,
            duration_days: req.duration_days,
            annual_fee: req.annual_fee,
        })
        .await?;
    Ok(Json(PlanDto::from(plan)))
}

/// List member profiles with their plan names.
#[utoipa::path(
    get,
    path = "/members",
    responses(
        (status = 200, description = "All members", body = [MemberDto]),
        (status = 403, description = "Caller is not staff", body = ErrorBody)
    )
)]
pub async fn list_members_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ErrorResponse> {
    require_staff(&principal)?;
    let profiles = state.store.list_profiles().await?;

    // Resolve plan names with one batched lookup keyed by id.
    let mut plan_ids: Vec<Uuid> = profiles
        .iter()
        .filter_map(|p| p.membership_plan_id)
        .collect();
    plan_ids.sort_unstable();
    plan_ids.dedup();
    let plans: HashMap<Uuid, String> = state
        .store
        .plans_by_ids(&plan_ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();

    let members: Vec<MemberDto> = profiles
        .into_iter()
        .map(|profile| {
            let plan_name = profile
                .membership_plan_id
                .and_then(|id| plans.get(&id).cloned());
            MemberDto::from_profile(profile, plan_name)
        })
        .collect();
    Ok(Json(members))
}

/// Fetch one member profile. Staff may fetch anyone; members only themselves.
#[utoipa::path(
    get,
    path = "/members/{id}",
    params(("id" = Uuid, Path, description = "Member id")),
    responses(
        (status = 200, description = "The profile", body = MemberDto),
        (status = 403, description = "Not the caller's profile", body = ErrorBody),
        (status = 404, description = "No such member", body = ErrorBody)
    )
)]
pub async fn get_member_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ErrorResponse> {
    if !principal.is_staff() && principal.user_id != id {
        return Err(ErrorResponse::forbidden("Forbidden: Staff access required"));
    }
    let profile = state.store.profile(id).await?;
    let plan_name = match profile.membership_plan_id {
        Some(plan_id) => Some(state.store.plan(plan_id).await?.name),
        None => None,
    };
    Ok(Json(MemberDto::from_profile(profile, plan_name)))
}
