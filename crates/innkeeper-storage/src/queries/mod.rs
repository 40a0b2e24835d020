// SPDX-FileCopyrightText: 2026 Innkeeper Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Each function takes a `&Database` and runs its SQL
//! through the connection's background thread.

pub mod queue;
pub mod rate_limits;
