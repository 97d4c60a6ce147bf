// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 进度账本检查点测试
///
/// 验证两次检查点之间崩溃时最多丢失 N-1 个完成记录

#[cfg(test)]
mod tests {
    use realty_crawler::domain::models::work_unit::LedgerKey;
    use realty_crawler::infrastructure::progress_ledger::ProgressLedger;

    fn unit(i: usize) -> LedgerKey {
        LedgerKey::Unit(format!("https://acme.test/l/{}", i))
    }

    #[test]
    fn test_crash_between_checkpoints_loses_at_most_n_minus_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");

        let ledger = ProgressLedger::load(&path, 3).unwrap();
        for i in 0..5 {
            ledger.mark_done(&unit(i));
        }
        // Dropped without a final persist
        drop(ledger);

        let reloaded = ProgressLedger::load(&path, 3).unwrap();
        let (_, units) = reloaded.len();
        assert_eq!(units, 3);
        assert!((0..3).all(|i| reloaded.is_done(&unit(i))));
        assert!(!reloaded.is_done(&unit(4)));
    }

    #[test]
    fn test_final_persist_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("progress.json");

        let ledger = ProgressLedger::load(&path, 100).unwrap();
        ledger.mark_done(&LedgerKey::Group("Acme".into(), "https://acme.test".into()));
        ledger.mark_done(&unit(1));
        ledger.add_group_rows("Acme", 4);
        ledger.persist().unwrap();

        let reloaded = ProgressLedger::load(&path, 100).unwrap();
        assert_eq!(reloaded.len(), (1, 1));
        assert_eq!(reloaded.group_row_counts().get("Acme"), Some(&4));
        assert!(!path.with_extension("json.tmp").exists());
    }
}
