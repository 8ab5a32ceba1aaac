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

use clap::Parser;
use std::path::PathBuf;

use riskmesh_server::config::RiskMeshConfig;
use riskmesh_server::run_server;

#[derive(Parser, Debug)]
#[command(name = "riskmesh-server", about = "RiskMesh online fraud-scoring engine")]
struct Args {
    /// Path to a TOML configuration file. Missing fields fall back to
    /// environment variables, then to built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `server.listen_addr` from the config file/defaults.
    #[arg(long, env = "RISKMESH_HTTP_ADDR")]
    listen_addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = RiskMeshConfig::load(args.config)?;
    if let Some(addr) = args.listen_addr {
        config.server.listen_addr = addr;
    }

    run_server(config).await
}
