// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod adapter;
pub mod cursor;

pub use adapter::*;
pub use cursor::*;
