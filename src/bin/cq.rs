//
// Copyright 2022 The Notation COSE Plugin Authors.
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

//! Command-line CBOR processor.
//!
//! Reads a CBOR item from stdin and pretty-prints its structure, descending
//! into tag 18 (COSE_Sign1) and tag 1 (datetime) content.

use clap::Parser;

use notation_cose::cbor::inspect;

#[derive(Parser)]
#[command(name = "cq")]
#[command(about = "Command-line CBOR processor", long_about = None)]
#[command(version)]
struct Cli {}

fn main() {
    let _cli = Cli::parse();
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    if let Err(error) = inspect::dump(&mut stdin.lock(), &mut stdout.lock()) {
        eprintln!("{error}");
        std::process::exit(1);
    }
}
