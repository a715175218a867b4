use actix_web::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::{
    model::{
        message::NewMessage,
        time_off::{TimeOffRequest, TimeOffStatus},
    },
    workflow::Member,
};

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Decision {
    Approve,
    Deny,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Manager,
    Hr,
    Requester,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("Request is already {0}")]
    AlreadyDecided(TimeOffStatus),

    #[error("You cannot decide your own request")]
    SelfReview,

    #[error("Only managers and admins can review requests")]
    NotReviewer,

    #[error("You cannot act on requests outside your team")]
    OutsideTeam,

    #[error("Requester has no manager; the request cannot enter the manager stage")]
    NoManagerStage,

    #[error("Request is awaiting manager approval")]
    AwaitingManager,

    #[error("Access denied. HR only")]
    NotHr,

    #[error("Only the requester can cancel this request")]
    NotRequester,
}

impl WorkflowError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WorkflowError::AlreadyDecided(_)
            | WorkflowError::NoManagerStage
            | WorkflowError::AwaitingManager => StatusCode::CONFLICT,
            WorkflowError::SelfReview
            | WorkflowError::NotReviewer
            | WorkflowError::OutsideTeam
            | WorkflowError::NotHr
            | WorkflowError::NotRequester => StatusCode::FORBIDDEN,
        }
    }
}

/// Outcome of an accepted action, ready to be applied and persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: TimeOffStatus,
    pub to: TimeOffStatus,
    pub stage: Stage,
    pub actor_user_id: u64,
    pub decided_at: DateTime<Utc>,
    pub notifications: Vec<NewMessage>,
}

impl Transition {
    /// Writes the new state and the stage bookkeeping onto the request.
    pub fn apply(&self, request: &mut TimeOffRequest) {
        request.status = self.to;
        request.updated_at = self.decided_at;
        match self.stage {
            Stage::Manager => {
                request.manager_id = Some(self.actor_user_id);
                request.manager_decision_at = Some(self.decided_at);
            }
            Stage::Hr => {
                request.hr_id = Some(self.actor_user_id);
                request.hr_decision_at = Some(self.decided_at);
            }
            Stage::Requester => {}
        }
    }

    pub fn summary(&self) -> &'static str {
        match (self.stage, self.to) {
            (Stage::Manager, TimeOffStatus::ManagerApproved) => "Request sent to HR for approval",
            (_, TimeOffStatus::Approved) => "Request approved",
            (_, TimeOffStatus::Denied) => "Request denied",
            (_, TimeOffStatus::Cancelled) => "Request cancelled",
            _ => "Request updated",
        }
    }
}

/// Decides a reviewer's action on a request.
///
/// The stage follows the request status: PENDING requests are decided by the
/// requester's direct manager, MANAGER_APPROVED requests by HR or an admin.
pub fn decide(
    request: &TimeOffRequest,
    requester: &Member,
    actor: &Member,
    decision: Decision,
    hr_department: &str,
    now: DateTime<Utc>,
) -> Result<Transition, WorkflowError> {
    if request.status.is_terminal() {
        return Err(WorkflowError::AlreadyDecided(request.status));
    }
    if request.user_id == actor.user_id {
        return Err(WorkflowError::SelfReview);
    }

    match request.status {
        TimeOffStatus::Pending => {
            manager_stage(request, requester, actor, decision, hr_department, now)
        }
        TimeOffStatus::ManagerApproved => hr_stage(request, requester, actor, decision, hr_department, now),
        other => Err(WorkflowError::AlreadyDecided(other)),
    }
}

fn manager_stage(
    request: &TimeOffRequest,
    requester: &Member,
    actor: &Member,
    decision: Decision,
    hr_department: &str,
    now: DateTime<Utc>,
) -> Result<Transition, WorkflowError> {
    if !actor.is_reviewer() {
        return Err(WorkflowError::NotReviewer);
    }
    if !actor.manages(requester) {
        if requester.manager_id.is_none() {
            return Err(WorkflowError::NoManagerStage);
        }
        if actor.is_hr_or_admin(hr_department) {
            return Err(WorkflowError::AwaitingManager);
        }
        return Err(WorkflowError::OutsideTeam);
    }

    let to = match decision {
        Decision::Approve => TimeOffStatus::ManagerApproved,
        Decision::Deny => TimeOffStatus::Denied,
    };

    Ok(Transition {
        from: request.status,
        to,
        stage: Stage::Manager,
        actor_user_id: actor.user_id,
        decided_at: now,
        notifications: Vec::new(),
    })
}

fn hr_stage(
    request: &TimeOffRequest,
    requester: &Member,
    actor: &Member,
    decision: Decision,
    hr_department: &str,
    now: DateTime<Utc>,
) -> Result<Transition, WorkflowError> {
    if !actor.is_hr_or_admin(hr_department) {
        return Err(WorkflowError::NotHr);
    }

    let (to, verb) = match decision {
        Decision::Approve => (TimeOffStatus::Approved, "approved"),
        Decision::Deny => (TimeOffStatus::Denied, "denied"),
    };

    let mut notifications = vec![NewMessage {
        sender_id: actor.user_id,
        recipient_id: request.user_id,
        subject: Some(format!("Time off {verb}")),
        body: format!("Your time-off request was {verb} by HR."),
    }];
    if let Some(manager_id) = request.manager_id.filter(|id| *id != actor.user_id) {
        notifications.push(NewMessage {
            sender_id: actor.user_id,
            recipient_id: manager_id,
            subject: Some(format!("Time off {verb} (team)")),
            body: format!("{}'s request was {verb} by HR.", requester.username),
        });
    }

    Ok(Transition {
        from: request.status,
        to,
        stage: Stage::Hr,
        actor_user_id: actor.user_id,
        decided_at: now,
        notifications,
    })
}

/// The requester withdraws a request that has not reached a final state.
pub fn cancel(
    request: &TimeOffRequest,
    actor_user_id: u64,
    now: DateTime<Utc>,
) -> Result<Transition, WorkflowError> {
    if request.status.is_terminal() {
        return Err(WorkflowError::AlreadyDecided(request.status));
    }
    if request.user_id != actor_user_id {
        return Err(WorkflowError::NotRequester);
    }

    Ok(Transition {
        from: request.status,
        to: TimeOffStatus::Cancelled,
        stage: Stage::Requester,
        actor_user_id,
        decided_at: now,
        notifications: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{role::Role, time_off::TimeOffType},
        workflow::member::fixtures::member,
    };
    use chrono::NaiveDate;

    const HR: &str = "Human Resources";

    // employee ids: manager 10, report 20, hr 30, admin 40, other manager 50
    fn manager() -> Member {
        member(1, 10, Role::Manager, None, "Engineering")
    }
    fn report() -> Member {
        member(2, 20, Role::Employee, Some(10), "Engineering")
    }
    fn hr() -> Member {
        member(3, 30, Role::Manager, None, "Human Resources")
    }
    fn admin() -> Member {
        member(4, 40, Role::Admin, None, "Operations")
    }
    fn other_manager() -> Member {
        member(5, 50, Role::Manager, None, "Sales")
    }

    fn request(status: TimeOffStatus) -> TimeOffRequest {
        let now = Utc::now();
        TimeOffRequest {
            id: 100,
            user_id: report().user_id,
            manager_id: Some(manager().user_id),
            hr_id: None,
            kind: TimeOffType::Vacation,
            status,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            reason: None,
            duration_days: 6,
            manager_decision_at: None,
            hr_decision_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn direct_manager_approves_to_hr_queue() {
        let now = Utc::now();
        let mut req = request(TimeOffStatus::Pending);
        let t = decide(&req, &report(), &manager(), Decision::Approve, HR, now).unwrap();

        assert_eq!(t.to, TimeOffStatus::ManagerApproved);
        assert_eq!(t.stage, Stage::Manager);
        assert!(t.notifications.is_empty());

        t.apply(&mut req);
        assert_eq!(req.status, TimeOffStatus::ManagerApproved);
        assert_eq!(req.manager_id, Some(1));
        assert_eq!(req.manager_decision_at, Some(now));
        assert_eq!(req.hr_id, None);
    }

    #[test]
    fn direct_manager_can_deny() {
        let req = request(TimeOffStatus::Pending);
        let t = decide(&req, &report(), &manager(), Decision::Deny, HR, Utc::now()).unwrap();
        assert_eq!(t.to, TimeOffStatus::Denied);
        assert_eq!(t.summary(), "Request denied");
    }

    #[test]
    fn manager_outside_hierarchy_is_rejected() {
        let req = request(TimeOffStatus::Pending);
        let err = decide(&req, &report(), &other_manager(), Decision::Approve, HR, Utc::now()).unwrap_err();
        assert_eq!(err, WorkflowError::OutsideTeam);
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn hr_and_admin_cannot_approve_pending() {
        let req = request(TimeOffStatus::Pending);
        for actor in [hr(), admin()] {
            let err = decide(&req, &report(), &actor, Decision::Approve, HR, Utc::now()).unwrap_err();
            assert_eq!(err, WorkflowError::AwaitingManager);
        }
    }

    #[test]
    fn hr_manager_who_is_direct_manager_only_advances_first_stage() {
        let hr_boss = member(3, 30, Role::Manager, None, "Human Resources");
        let hr_report = member(6, 60, Role::Employee, Some(30), "Human Resources");
        let mut req = request(TimeOffStatus::Pending);
        req.user_id = hr_report.user_id;

        let t = decide(&req, &hr_report, &hr_boss, Decision::Approve, HR, Utc::now()).unwrap();
        assert_eq!(t.to, TimeOffStatus::ManagerApproved);
    }

    #[test]
    fn employees_cannot_review() {
        let peer = member(7, 70, Role::Employee, None, "Engineering");
        let req = request(TimeOffStatus::Pending);
        let err = decide(&req, &report(), &peer, Decision::Approve, HR, Utc::now()).unwrap_err();
        assert_eq!(err, WorkflowError::NotReviewer);
    }

    #[test]
    fn requester_without_manager_has_no_first_stage() {
        let orphan = member(8, 80, Role::Employee, None, "Engineering");
        let mut req = request(TimeOffStatus::Pending);
        req.user_id = orphan.user_id;
        req.manager_id = None;

        for actor in [manager(), hr(), admin()] {
            let err = decide(&req, &orphan, &actor, Decision::Approve, HR, Utc::now()).unwrap_err();
            assert_eq!(err, WorkflowError::NoManagerStage);
        }
    }

    #[test]
    fn hr_approves_manager_approved_and_notifies() {
        let now = Utc::now();
        let mut req = request(TimeOffStatus::ManagerApproved);
        let t = decide(&req, &report(), &hr(), Decision::Approve, HR, now).unwrap();

        assert_eq!(t.to, TimeOffStatus::Approved);
        assert_eq!(t.stage, Stage::Hr);
        let recipients: Vec<u64> = t.notifications.iter().map(|n| n.recipient_id).collect();
        assert_eq!(recipients, vec![report().user_id, manager().user_id]);
        assert!(t.notifications.iter().all(|n| n.sender_id == hr().user_id));
        assert_eq!(t.notifications[1].body, "user2's request was approved by HR.");

        t.apply(&mut req);
        assert_eq!(req.hr_id, Some(3));
        assert_eq!(req.hr_decision_at, Some(now));
        assert_eq!(req.manager_id, Some(1));
    }

    #[test]
    fn admin_denies_at_hr_stage_regardless_of_hierarchy() {
        let req = request(TimeOffStatus::ManagerApproved);
        let t = decide(&req, &report(), &admin(), Decision::Deny, HR, Utc::now()).unwrap();
        assert_eq!(t.to, TimeOffStatus::Denied);
        assert_eq!(t.notifications.len(), 2);
        assert_eq!(t.notifications[0].subject.as_deref(), Some("Time off denied"));
    }

    #[test]
    fn plain_manager_cannot_act_at_hr_stage() {
        let req = request(TimeOffStatus::ManagerApproved);
        let err = decide(&req, &report(), &manager(), Decision::Approve, HR, Utc::now()).unwrap_err();
        assert_eq!(err, WorkflowError::NotHr);
    }

    #[test]
    fn hr_stage_skips_manager_notification_when_unassigned() {
        let mut req = request(TimeOffStatus::ManagerApproved);
        req.manager_id = None;
        let t = decide(&req, &report(), &hr(), Decision::Approve, HR, Utc::now()).unwrap();
        assert_eq!(t.notifications.len(), 1);
    }

    #[test]
    fn terminal_requests_reject_every_decision() {
        for status in [TimeOffStatus::Approved, TimeOffStatus::Denied, TimeOffStatus::Cancelled] {
            let req = request(status);
            for actor in [manager(), hr(), admin()] {
                for decision in [Decision::Approve, Decision::Deny] {
                    let err = decide(&req, &report(), &actor, decision, HR, Utc::now()).unwrap_err();
                    assert_eq!(err, WorkflowError::AlreadyDecided(status));
                }
            }
        }
    }

    #[test]
    fn nobody_decides_their_own_request() {
        let mut req = request(TimeOffStatus::ManagerApproved);
        req.user_id = admin().user_id;
        let err = decide(&req, &admin(), &admin(), Decision::Approve, HR, Utc::now()).unwrap_err();
        assert_eq!(err, WorkflowError::SelfReview);
    }

    #[test]
    fn requester_cancels_open_requests_only() {
        let now = Utc::now();
        for status in [TimeOffStatus::Pending, TimeOffStatus::ManagerApproved] {
            let mut req = request(status);
            let t = cancel(&req, report().user_id, now).unwrap();
            t.apply(&mut req);
            assert_eq!(req.status, TimeOffStatus::Cancelled);
            assert_eq!(req.manager_decision_at, None);
        }

        let err = cancel(&request(TimeOffStatus::Approved), report().user_id, now).unwrap_err();
        assert_eq!(err, WorkflowError::AlreadyDecided(TimeOffStatus::Approved));
    }

    #[test]
    fn others_cannot_cancel() {
        let req = request(TimeOffStatus::Pending);
        let err = cancel(&req, manager().user_id, Utc::now()).unwrap_err();
        assert_eq!(err, WorkflowError::NotRequester);
    }

    #[test]
    fn decisions_parse_from_path_segments() {
        assert_eq!("approve".parse::<Decision>().unwrap(), Decision::Approve);
        assert_eq!("deny".parse::<Decision>().unwrap(), Decision::Deny);
        assert!("escalate".parse::<Decision>().is_err());
    }
}
