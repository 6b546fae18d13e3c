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

use crate::api::context_store::ContextStore;

/// Every line carries the context store of the unit of work that logged it.
pub fn format_dispatch(
    name: String,
    level: log::LevelFilter,
    overrides: Option<Vec<(String, log::LevelFilter)>>,
) -> fern::Dispatch {
    let mut dispatch = fern::Dispatch::new()
        .format(move |out, message, record| {
            let context = ContextStore::render().unwrap_or_default();
            out.finish(format_args!(
                "{}[{}][{}][{}][{}]-{}{}{}",
                chrono::Local::now().format("%Y-%m-%d-%H:%M:%S.%3f"),
                std::thread::current().name().unwrap_or("none"),
                record.level(),
                record.target(),
                name,
                message,
                if context.is_empty() { "" } else { " " },
                context
            ))
        })
        .level(level);
    for (target, filter) in overrides.unwrap_or_default() {
        dispatch = dispatch.level_for(target, filter);
    }
    dispatch
}

pub fn init_logger(
    name: String,
    level: log::LevelFilter,
    overrides: Option<Vec<(String, log::LevelFilter)>>,
) -> Result<(), fern::InitError> {
    format_dispatch(name, level, overrides)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}
