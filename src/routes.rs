//! Application route table.
use crate::auth;
use crate::handlers;
use crate::route;
use crate::router::{AppState, Middleware, PostMiddleware, Response, Router};
use crate::router::{middleware, post_middleware};

/// Build the router for the API with CORS applied to every response.
pub fn build(state: AppState) -> Router {
    let mut router = Router::new();
    let protected = auth::protected(state.jwt.clone());

    router.add_middleware(preflight());
    router.add_post_middleware(cors(&state.settings.frontend_url));

    route!(router,
        POST "/api/auth/register" => { handlers::register },
        POST "/api/auth/login" => { handlers::login },
        GET "/api/profile" => { handlers::profile, protected },
    );

    router.set_app_state(state);
    router
}

/// Answer `OPTIONS` requests before routing.
pub fn preflight() -> Middleware {
    middleware(|ctx| {
        if ctx.method == "OPTIONS" {
            Some(
                Response::no_content()
                    .with_header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
                    .with_header(
                        "Access-Control-Allow-Headers",
                        "Origin, Content-Type, Accept, Authorization",
                    ),
            )
        } else {
            None
        }
    })
}

/// Echo the configured frontend origin on every response.
pub fn cors(origin: &str) -> PostMiddleware {
    let origin = origin.to_string();
    post_middleware(move |_ctx, response| {
        response
            .with_header("Access-Control-Allow-Origin", origin.clone())
            .with_header("Access-Control-Allow-Credentials", "true")
    })
}
