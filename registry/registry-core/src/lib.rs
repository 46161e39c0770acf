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
//! # wgd registry core
//!
//! Admission of VPN users and assignment of device addresses out of
//! administrator defined IPv4 subnets.
//!
//! [service::RegistryService] is the entry point. It composes
//! [subnets::SubnetRegistry], which owns one address allocator per subnet,
//! and [users::UserAdmission], which drives the user lifecycle. All state is
//! kept in a [store::DocumentStore].

pub mod error;
pub mod locks;
pub mod model;
pub mod pagination;
pub mod service;
pub mod store;
pub mod subnets;
pub mod users;
