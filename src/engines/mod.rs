// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod api_discovery;
pub mod domain_gate;
pub mod fallback;
pub mod playwright_engine;
pub mod proxy_rotator;
pub mod reqwest_engine;
pub mod sitemap;
pub mod traits;
pub mod validators;
