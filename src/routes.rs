use crate::{
    api::{
        attendance, dashboard, department, employee, message, paystub, profile, task, team, time_off,
        time_tracking,
    },
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;
use tracing::warn;

/// Per-IP limiter allowing `requests_per_min` with a burst of the same size.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        60_000 / u64::from(requests_per_min)
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms.max(1))
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_else(|| {
            warn!(requests_per_min, "Invalid rate limit, using governor defaults");
            GovernorConfig::default()
        });
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(register_limiter)
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter)
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(protected_limiter)
            .service(
                web::scope("/time-off")
                    .service(
                        web::resource("")
                            .route(web::get().to(time_off::my_requests))
                            .route(web::post().to(time_off::create_request)),
                    )
                    .service(web::resource("/team").route(web::get().to(time_off::team_requests)))
                    .service(web::resource("/hr-queue").route(web::get().to(time_off::hr_queue)))
                    .service(web::resource("/{id}").route(web::get().to(time_off::get_request)))
                    // cancel must win over the generic decision route
                    .service(web::resource("/{id}/cancel").route(web::post().to(time_off::cancel_request)))
                    .service(web::resource("/{id}/{action}").route(web::post().to(time_off::decide_request))),
            )
            .service(
                web::resource("/profile/{user_id}")
                    .route(web::get().to(profile::profile_form))
                    .route(web::put().to(profile::update_profile)),
            )
            .service(web::resource("/users").route(web::get().to(profile::list_users)))
            .service(
                web::scope("/employees")
                    .service(
                        web::resource("")
                            .route(web::post().to(employee::create_employee))
                            .route(web::get().to(employee::list_employees)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(employee::update_employee))
                            .route(web::get().to(employee::get_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    ),
            )
            .service(
                web::resource("/departments")
                    .route(web::get().to(department::list_departments))
                    .route(web::post().to(department::create_department)),
            )
            .service(
                web::scope("/teams")
                    .service(
                        web::resource("")
                            .route(web::get().to(team::list_teams))
                            .route(web::post().to(team::create_team)),
                    )
                    .service(
                        web::resource("/{id}/members")
                            .route(web::get().to(team::list_members))
                            .route(web::post().to(team::add_member)),
                    )
                    .service(web::resource("/{id}/members/{user_id}").route(web::delete().to(team::remove_member))),
            )
            .service(
                web::scope("/messages")
                    .service(web::resource("").route(web::post().to(message::compose)))
                    .service(web::resource("/inbox").route(web::get().to(message::inbox)))
                    .service(web::resource("/sent").route(web::get().to(message::sent)))
                    .service(web::resource("/{id}").route(web::get().to(message::view)))
                    .service(web::resource("/{id}/reply").route(web::post().to(message::reply))),
            )
            .service(
                web::scope("/tasks")
                    .service(
                        web::resource("")
                            .route(web::get().to(task::my_tasks))
                            .route(web::post().to(task::create_task)),
                    )
                    .service(web::resource("/created").route(web::get().to(task::created_tasks)))
                    .service(web::resource("/{id}").route(web::get().to(task::get_task)))
                    .service(web::resource("/{id}/status").route(web::put().to(task::update_status))),
            )
            .service(
                web::scope("/attendance")
                    .service(
                        web::resource("")
                            .route(web::get().to(attendance::my_attendance))
                            .route(web::post().to(attendance::mark_today)),
                    )
                    .service(web::resource("/team").route(web::get().to(attendance::team_attendance))),
            )
            .service(
                web::scope("/time")
                    .service(web::resource("").route(web::get().to(time_tracking::my_entries)))
                    .service(web::resource("/clock-in").route(web::post().to(time_tracking::clock_in)))
                    .service(web::resource("/clock-out").route(web::post().to(time_tracking::clock_out))),
            )
            .service(
                web::resource("/paystubs")
                    .route(web::get().to(paystub::my_paystubs))
                    .route(web::post().to(paystub::create_paystub)),
            )
            .service(
                web::scope("/dashboard")
                    .service(web::resource("/admin").route(web::get().to(dashboard::admin_dashboard)))
                    .service(web::resource("/manager").route(web::get().to(dashboard::manager_dashboard))),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with Authorization: Bearer refresh_token
//       └─ returns a new token pair, old refresh token revoked

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_falls_back_instead_of_panicking() {
        let _ = build_limiter(0);
        let _ = build_limiter(60);
    }
}
