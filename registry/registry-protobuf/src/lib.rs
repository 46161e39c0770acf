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
//! Protobuf messages of the wgd registry API and their conversion to the
//! registry model.

pub mod convert;

/// Generated code.
#[allow(missing_docs)]
pub mod wgd {
    /// Generated code.
    pub mod registry {
        /// Generated code.
        pub mod v1 {
            include!("proto/wgd.registry.v1.rs");
        }
    }
}
