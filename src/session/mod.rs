// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cookie sessions: codec, refresher, route classification and the gate's
//! routing decision.

pub mod codec;
pub mod gate;
pub mod refresh;
pub mod routes;

pub use codec::CookieSettings;
pub use gate::{decide, Decision};
pub use refresh::refresh_session;
pub use routes::{RouteClass, RouteTable, UnlistedRoutes};
