use axum::{
    Router,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    AppState,
    middleware::{auth_middleware, log_errors},
    routes,
};

pub fn create_router(state: AppState) -> Router {
    // 将路由分为公开路由和受保护路由
    let public_routes = Router::new()
        .route("/auth/register", post(routes::user::register))
        .route("/auth/login", post(routes::user::login));

    let protected_routes = Router::new()
        // 用户
        .route("/auth/refresh-token", post(routes::user::refresh_token))
        .route("/users", get(routes::user::list_users))
        .route(
            "/users/me",
            get(routes::user::get_me)
                .put(routes::user::update_me)
                .delete(routes::user::delete_me),
        )
        .route("/users/{user_id}", get(routes::user::get_user))
        // 好友
        .route(
            "/friends",
            post(routes::friend::send_request).get(routes::friend::list_friends),
        )
        .route("/friends/requests", get(routes::friend::list_requests))
        .route("/friends/with/{user_id}", get(routes::friend::get_between))
        .route(
            "/friends/{friendship_id}",
            put(routes::friend::update_status).delete(routes::friend::delete_friendship),
        )
        // 群组
        .route("/groups", post(routes::group::create_group))
        .route("/groups/mine", get(routes::group::list_my_groups))
        .route("/groups/by-name", get(routes::group::find_by_name))
        .route(
            "/groups/{group_id}",
            get(routes::group::get_group)
                .put(routes::group::update_group)
                .delete(routes::group::delete_group),
        )
        .route(
            "/groups/{group_id}/members",
            get(routes::group::list_members).post(routes::group::add_member),
        )
        .route(
            "/groups/{group_id}/members/{user_id}",
            put(routes::group::update_member).delete(routes::group::remove_member),
        )
        // 消息
        .route("/messages", post(routes::message::send_message))
        .route(
            "/messages/conversation/{user_id}",
            get(routes::message::list_conversation),
        )
        .route(
            "/messages/group/{group_id}",
            get(routes::message::list_group_messages),
        )
        .route(
            "/messages/{message_id}",
            get(routes::message::get_message)
                .put(routes::message::update_message)
                .delete(routes::message::delete_message),
        )
        .route(
            "/messages/{message_id}/read",
            post(routes::message::mark_message_read),
        )
        // 通知
        .route("/notifications", get(routes::notification::list_notifications))
        .route(
            "/notifications/{notification_id}",
            axum::routing::delete(routes::notification::delete_notification),
        )
        .route(
            "/notifications/{notification_id}/read",
            post(routes::notification::mark_notification_read),
        )
        // 应用认证中间件
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let router = Router::new()
        .nest(
            &state.config.api_base_uri,
            Router::new().merge(public_routes).merge(protected_routes),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(log_errors)),
        );

    // 开发模式下允许跨域
    #[cfg(debug_assertions)]
    let router = router.layer(tower_http::cors::CorsLayer::permissive());

    router.with_state(state)
}
