// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Routing decision made once per request by the session gate.

use crate::session::routes::RouteClass;

pub const LOGIN_PATH: &str = "/login";
pub const HOME_PATH: &str = "/";

/// What the gate does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    RedirectTo(&'static str),
}

pub fn decide(class: RouteClass, signed_in: bool) -> Decision {
    match (class, signed_in) {
        (RouteClass::Protected, false) => Decision::RedirectTo(LOGIN_PATH),
        (RouteClass::AuthEntry, true) => Decision::RedirectTo(HOME_PATH),
        _ => Decision::Continue,
    }
}
