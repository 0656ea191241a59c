//! Missing-fixture detection against a real on-disk ingest tree.

use fbref_pipeline::config::Paths;
use fbref_pipeline::missing;
use fbref_pipeline::table::Value;

fn write_csv(paths: &Paths, rel: &str, content: &str) {
    let path = paths.ingest_dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[test]
fn report_reflects_what_the_tree_already_holds() {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::from_base(dir.path());

    write_csv(
        &paths,
        "match_results/ENG_M_1st_match_results_wf.csv",
        "MatchURL,Country,Gender,Tier,Season_End_Year,Notes\n\
         /en/matches/aaa/X,ENG,M,1st,2023,\n\
         /en/matches/bbb/X,ENG,M,1st,2023,\n\
         /en/matches/ccc/X,ENG,M,1st,2023,Match Cancelled\n",
    );
    // aaa is fully ingested; bbb is nowhere yet; ccc is cancelled.
    write_csv(
        &paths,
        "match_summary/ENG_M_1st_match_summary_fbref_0001.csv",
        "MatchURL,Team\n/en/matches/aaa/X,Arsenal\n",
    );
    write_csv(
        &paths,
        "advanced_match_stats/team/summary/ENG_M_1st_fbref_0001.csv",
        "MatchURL,Team\n/en/matches/aaa/X,Arsenal\n",
    );
    write_csv(
        &paths,
        "advanced_match_stats/team/possession/ENG_M_1st_fbref_0001.csv",
        "MatchURL,Team\n/en/matches/aaa/X,Arsenal\n",
    );

    let report = missing::missing_matches(&paths, "M").unwrap();
    assert_eq!(report.fixtures_considered, 2);
    assert_eq!(report.missing.height(), 1);
    assert_eq!(
        report.missing.get(0, "MatchURL"),
        Some(&Value::Str("/en/matches/bbb/X".into()))
    );
    assert_eq!(
        report.missing.get(0, "filename"),
        Some(&Value::Str("html/ENG/X.html".into()))
    );
}

#[test]
fn unreadable_presence_file_is_a_warning_not_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::from_base(dir.path());

    write_csv(
        &paths,
        "match_results/ENG_M_1st_match_results_wf.csv",
        "MatchURL,Country,Gender,Tier,Season_End_Year,Notes\n/en/matches/aaa/X,ENG,M,1st,2023,\n",
    );
    // A directory where a presence CSV should be: unreadable as a file.
    std::fs::create_dir_all(paths.ingest_dir.join("match_summary/broken.csv")).unwrap();

    let report = missing::missing_matches(&paths, "M").unwrap();
    assert_eq!(report.missing.height(), 1);
    assert!(!report.warnings.is_empty());
}

#[test]
fn no_match_results_at_all_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::from_base(dir.path());
    assert!(missing::missing_matches(&paths, "M").is_err());
}
