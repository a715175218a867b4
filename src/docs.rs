use crate::api::{
    attendance::MarkAttendance,
    dashboard::{AdminDashboard, ManagerDashboard},
    department::CreateDepartment,
    employee::{CreateEmployee, EmployeeListResponse, EmployeeQuery, UpdateEmployee},
    message::{ComposeMessage, InboxResponse, ReplyMessage},
    paystub::CreatePaystub,
    profile::ProfileForm,
    task::{CreateTask, UpdateTaskStatus},
    team::{AddMember, CreateTeam},
    time_off::{CreateTimeOff, TimeOffActionResponse, TimeOffFilter},
};
use crate::error::{ErrorBody, FieldErrors, MessageBody};
use crate::model::{
    attendance::{Attendance, AttendanceStatus},
    department::Department,
    employee::Employee,
    message::Message,
    paystub::Paystub,
    role::Role,
    task::{Task, TaskPriority, TaskStatus},
    team::{Team, TeamMember},
    time_entry::TimeEntry,
    time_off::{TimeOffRequest, TimeOffStatus, TimeOffType},
    user::UserSummary,
};
use crate::models::{LoginRequest, RegisterRequest, TokenPair};
use crate::policy::profile::{FieldAccess, FormField, ProfileField, ProfileSubmission};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "TeamHR API",
        version = "1.0.0",
        description = r#"
## Team HR platform

Staff directory, two-stage time-off approvals and self-service records.

### Key Features
- **Time off**: requests go to the direct manager first, then to HR
- **Profiles**: one permission table decides which fields each actor sees and may change
- **Directory**: departments, teams and employees with a reporting line
- **Self-service**: messages, tasks, attendance, time tracking and paystubs

### Security
Every endpoint outside `/auth` expects `Authorization: Bearer <access token>`.
Roles are re-read from the database on each decision.

### Errors
Failures return `{"message": ..., "errors": {field: [..]}}`; field errors come with 422.
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::time_off::create_request,
        crate::api::time_off::my_requests,
        crate::api::time_off::team_requests,
        crate::api::time_off::hr_queue,
        crate::api::time_off::get_request,
        crate::api::time_off::decide_request,
        crate::api::time_off::cancel_request,

        crate::api::profile::profile_form,
        crate::api::profile::update_profile,
        crate::api::profile::list_users,

        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,

        crate::api::department::list_departments,
        crate::api::department::create_department,

        crate::api::team::list_teams,
        crate::api::team::create_team,
        crate::api::team::list_members,
        crate::api::team::add_member,
        crate::api::team::remove_member,

        crate::api::message::inbox,
        crate::api::message::sent,
        crate::api::message::compose,
        crate::api::message::view,
        crate::api::message::reply,

        crate::api::task::my_tasks,
        crate::api::task::created_tasks,
        crate::api::task::create_task,
        crate::api::task::get_task,
        crate::api::task::update_status,

        crate::api::attendance::mark_today,
        crate::api::attendance::my_attendance,
        crate::api::attendance::team_attendance,

        crate::api::time_tracking::clock_in,
        crate::api::time_tracking::clock_out,
        crate::api::time_tracking::my_entries,

        crate::api::paystub::my_paystubs,
        crate::api::paystub::create_paystub,

        crate::api::dashboard::admin_dashboard,
        crate::api::dashboard::manager_dashboard
    ),
    components(
        schemas(
            ErrorBody,
            FieldErrors,
            MessageBody,
            RegisterRequest,
            LoginRequest,
            TokenPair,
            Role,
            CreateTimeOff,
            TimeOffFilter,
            TimeOffActionResponse,
            TimeOffRequest,
            TimeOffStatus,
            TimeOffType,
            ProfileForm,
            ProfileField,
            FieldAccess,
            FormField,
            ProfileSubmission,
            UserSummary,
            CreateEmployee,
            UpdateEmployee,
            EmployeeQuery,
            EmployeeListResponse,
            Employee,
            CreateDepartment,
            Department,
            CreateTeam,
            AddMember,
            Team,
            TeamMember,
            ComposeMessage,
            ReplyMessage,
            InboxResponse,
            Message,
            CreateTask,
            UpdateTaskStatus,
            Task,
            TaskStatus,
            TaskPriority,
            MarkAttendance,
            Attendance,
            AttendanceStatus,
            TimeEntry,
            CreatePaystub,
            Paystub,
            AdminDashboard,
            ManagerDashboard
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration, login and token rotation"),
        (name = "Time Off", description = "Two-stage time-off approval"),
        (name = "Profile", description = "Permission-driven profile editing"),
        (name = "Employee", description = "Employee directory management"),
        (name = "Organization", description = "Departments, teams and team members"),
        (name = "Messages", description = "Direct messages between users"),
        (name = "Tasks", description = "Task assignment and progress"),
        (name = "Attendance", description = "Daily attendance marks"),
        (name = "Time Tracking", description = "Clock in and clock out"),
        (name = "Payroll", description = "Paystubs"),
        (name = "Dashboard", description = "Admin and manager overviews"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_workflow_routes_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/time-off/{request_id}/{action}"));
        assert!(doc.paths.paths.contains_key("/api/profile/{user_id}"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
