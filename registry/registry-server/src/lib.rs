// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! # wgd registry server
//!
//! Serves [wgd_registry_core::service::RegistryService] as a Connect RPC API
//! over mutual TLS. Requests other than `HealthCheck` and `AcceptInvite`
//! carry an EdDSA bearer token whose subject is the email of an active user.

pub mod cli;
pub mod config;
pub mod crpc_api;
pub mod runtime;
pub mod server;
pub mod tls;
