// Copyright 2023 Comcast Cable Communications Management, LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0
//

#[macro_export]
macro_rules! sync_mutex_lock {
    ($lock:expr) => {
        match $lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                $crate::log::warn!("Mutex poisoned, recovering with inner value");
                poisoned.into_inner()
            }
        }
    };
}
