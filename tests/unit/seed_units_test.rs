// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 种子加载与工作单元测试

#[cfg(test)]
mod tests {
    use realty_crawler::config::settings::InputSettings;
    use realty_crawler::domain::models::work_unit::{LedgerKey, UnitKind, WorkUnit};
    use realty_crawler::domain::services::seed_loader::load_seeds;
    use realty_crawler::utils::errors::SeedError;

    fn input(dir: &std::path::Path, listings: bool) -> InputSettings {
        InputSettings {
            agencies_path: dir.join("agencies.csv"),
            listings_path: listings.then(|| dir.join("listings.csv")),
            delimiter: ",".to_string(),
        }
    }

    #[test]
    fn test_seed_files_become_work_units() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("agencies.csv"),
            "\u{feff}Agency Name,Website,Country\nAcme, https://Acme.test ,Spain\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("listings.csv"),
            "Agency Name,Listing URL,Title,ISO\n\
             Beta,https://beta.test/1,Flat,ES\n\
             Acme,https://acme.test/1,Villa,ES\n\
             Beta,https://beta.test/2,Loft,ES\n",
        )
        .unwrap();

        let seeds = load_seeds(&input(dir.path(), true)).unwrap();

        let agency = WorkUnit::agency(seeds.agencies[0].clone());
        assert_eq!(agency.kind(), UnitKind::Agency);
        assert_eq!(agency.host(), "acme.test");
        assert_eq!(
            agency.ledger_key(),
            LedgerKey::Group("Acme".into(), "https://Acme.test".into())
        );

        let groups: Vec<&str> = seeds.listings.iter().map(|(g, _)| g.as_str()).collect();
        assert_eq!(groups, vec!["Beta", "Acme"]);
        let beta: Vec<WorkUnit> = seeds.listings[0]
            .1
            .iter()
            .cloned()
            .map(WorkUnit::listing)
            .collect();
        assert_eq!(beta.len(), 2);
        assert_eq!(beta[1].seed().get("Title"), "Loft");
        assert_eq!(beta[1].ledger_key(), LedgerKey::Unit("https://beta.test/2".into()));
    }

    #[test]
    fn test_ragged_seed_file_aborts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("agencies.csv"),
            "Agency Name,Website\nAcme,https://acme.test,extra\n",
        )
        .unwrap();

        assert!(matches!(
            load_seeds(&input(dir.path(), false)),
            Err(SeedError::Malformed { .. })
        ));
    }

    #[test]
    fn test_missing_listing_file_aborts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("agencies.csv"), "Agency Name,Website\n").unwrap();

        assert!(matches!(
            load_seeds(&input(dir.path(), true)),
            Err(SeedError::Io { .. })
        ));
    }
}
