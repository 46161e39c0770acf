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
//! # Address Manager
//!
//! Manage the host addresses of IPv4 subnets.
//!
//! [cidr::SubnetCidr] validates a subnet block and exposes its usable host
//! range. The allocation state of one block (which host address to hand out
//! next) is managed by [allocator::AddressAllocator].

pub mod allocator;
pub mod cidr;
