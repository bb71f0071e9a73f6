// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::*;
use camino::Utf8Path;
use integration_tests::fixtures::{FIXTURE_ASSET, entry};
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use tessera_runner::{
    pipeline::{BoxError, BuildPipeline, BuiltEntries},
    watch::WatchSession,
};

/// Replays a fixed sequence of builds. Each build is a list of `(file, chunk hash)` pairs.
struct Rebuilds {
    builds: VecDeque<Vec<(&'static str, &'static str)>>,
}

impl BuildPipeline for Rebuilds {
    fn build_entries(&mut self, _filters: &[String]) -> Result<BuiltEntries, BoxError> {
        let build = self.builds.pop_front().ok_or("no more builds")?;
        let entries = build
            .into_iter()
            .map(|(name, hash)| {
                let mut entry = entry(name).with_chunk("main", hash);
                if name == "asset" {
                    entry.files.insert(FIXTURE_ASSET.into());
                }
                entry
            })
            .collect();
        Ok(BuiltEntries {
            entries,
            ..BuiltEntries::default()
        })
    }

    fn read_artifact(&self, path: &Utf8Path) -> Result<String, BoxError> {
        if path.as_str() == FIXTURE_ASSET {
            Ok(r#"{"fixture": true}"#.to_owned())
        } else {
            Err(format!("unknown artifact `{path}`").into())
        }
    }
}

#[test]
fn watch_reruns_changed_files() -> color_eyre::Result<()> {
    let config = TesseraConfig::default_config("/fixtures");
    let runner = build_runner(&config, PoolMode::Watch, None)?;
    let pipeline = Rebuilds {
        builds: VecDeque::from([
            vec![("asset", "1"), ("pass", "1")],
            vec![("asset", "1"), ("pass", "2")],
            vec![("asset", "1"), ("pass", "2")],
        ]),
    };
    let mut session = WatchSession::new(pipeline, runner);

    let first = session.rerun(|_| {})?;
    let first = first.summary.expect("first build runs every file");
    assert_eq!(
        file_statuses(&first),
        vec![("asset.test", TestStatus::Pass), ("pass.test", TestStatus::Pass)],
        "errors: {:?}",
        first.results
    );

    let second = session.rerun(|_| {})?;
    let second = second.summary.expect("changed file reruns");
    assert_eq!(file_statuses(&second), vec![("pass.test", TestStatus::Pass)]);
    assert_ne!(second.run_id, first.run_id);

    let third = session.rerun(|_| {})?;
    assert!(third.summary.is_none(), "nothing changed");

    session.close();
    Ok(())
}
