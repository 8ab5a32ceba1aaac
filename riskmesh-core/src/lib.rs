// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! RiskMesh's online risk-scoring engine: the in-memory entity graph,
//! bounded-depth propagation, ring/cluster detection, time decay, and the
//! explanation assembler. HTTP transport, the durable sink, the cache, and
//! metrics exposition all live in `riskmesh-server` and reach the engine
//! only through the traits in [`traits`].

pub mod clustering;
pub mod decay;
pub mod engine;
pub mod entities;
pub mod error;
pub mod explain;
pub mod graph;
pub mod propagate;
pub mod rules;
pub mod traits;

pub use engine::{EngineConfig, RiskEngine, ScoreOutcome, TransactionEvent, TransactionRecord};
pub use entities::{Direction, EntityKind, NodeKey};
pub use error::{EngineError, EngineResult};
pub use graph::GraphStore;
