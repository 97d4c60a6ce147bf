// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod ledger_checkpoint_test;
pub mod seed_units_test;
