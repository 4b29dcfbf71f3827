use afniprep_rs::roi::{run_roi_analysis, Analysis, Measure, RoiMethod, RoiRequest};
use afniprep_rs::{AfniPrepError, RecordingRunner, Tool, Toolbox};
use std::path::Path;

fn tent_glm(root: &Path, id: &str) {
    let dir = root
        .join(format!("subj.{}", id))
        .join(format!("{}.results", id))
        .join("GLM_tent");
    std::fs::create_dir_all(&dir).unwrap();
    for name in [
        format!("stats.{}+tlrc.HEAD", id),
        format!("iresp.hit.{}+tlrc.HEAD", id),
        format!("iresp.miss.{}+tlrc.HEAD", id),
    ] {
        std::fs::write(dir.join(name), "").unwrap();
    }
}

fn sphere_timecourses() -> Analysis {
    Analysis {
        method: RoiMethod::Spherical,
        measure: Measure::Timecourses,
    }
}

fn runner(orientation: &'static str) -> RecordingRunner {
    RecordingRunner::with_responder(move |inv| {
        Ok(match inv.tool {
            Tool::ThreeDInfo => format!("{}\n", orientation),
            Tool::ThreeDMaskave => {
                let input = inv.args.last().cloned().unwrap_or_default();
                if input.ends_with(".101+tlrc") {
                    "1.0 [33 voxels]\n2.0 [33 voxels]\n3.0 [33 voxels]\n".to_string()
                } else {
                    "3.0 [33 voxels]\n4.0 [33 voxels]\n5.0 [33 voxels]\n".to_string()
                }
            }
            _ => String::new(),
        })
    })
}

#[tokio::test]
async fn test_sphere_timecourses_for_chosen_condition() {
    let tmp = tempfile::tempdir().unwrap();
    let results = tmp.path().join("subject_results");
    tent_glm(&results, "101");
    tent_glm(&results, "102");
    let masks = tmp.path().join("masks");
    std::fs::create_dir(&masks).unwrap();
    std::fs::write(masks.join("precuneus.txt"), "(-4, -58, 36)\n").unwrap();

    let mut req = RoiRequest::new(&results, &masks);
    req.analyses = vec![sphere_timecourses()];
    req.conditions = Some(vec!["hit".to_string()]);
    req.sphere_radius = 6;

    let runner = runner("LPI");
    let report = run_roi_analysis(&runner, &Toolbox::default(), &req).await.unwrap();

    let analysis = &report.analyses[0];
    assert_eq!(analysis.rois, vec!["precuneus"]);
    assert_eq!(analysis.conditions["GLM_tent"], vec!["hit"]);
    assert_eq!(analysis.averages, 2);
    assert!(report.warnings.is_empty());

    let csv = std::fs::read_to_string(analysis.master_csv.as_ref().unwrap()).unwrap();
    assert_eq!(
        csv,
        "timepoint,precuneus_hit_subj_count,precuneus_hit_average,precuneus_hit_sem\n\
         1,2,2.0,1.0\n\
         2,2,3.0,1.0\n\
         3,2,4.0,1.0\n"
    );
    assert!(analysis
        .master_csv
        .as_ref()
        .unwrap()
        .ends_with("Average_spherical_ROI_timecourses/master_spherical_ROI_timecourses_file.csv"));

    // the coordinate file is normalized for 3dUndump
    assert_eq!(
        std::fs::read_to_string(masks.join("precuneus.txt")).unwrap(),
        "-4 -58 36"
    );
    let undump = &runner.calls_to(Tool::ThreeDUndump)[0];
    assert_eq!(undump.arg_after("-srad"), Some("6"));
    assert_eq!(undump.arg_after("-xyz"), Some("temp_precuneus.txt"));

    // temp masks and per-subject averages are gone
    let glm_dir = results.join("subj.101/101.results/GLM_tent");
    let leftovers: Vec<String> = std::fs::read_dir(&glm_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.starts_with("temp_") || n.contains("ROI_averages"))
        .collect();
    assert!(leftovers.is_empty(), "left behind: {:?}", leftovers);
}

#[tokio::test]
async fn test_orientation_mismatch() {
    let tmp = tempfile::tempdir().unwrap();
    let results = tmp.path().join("subject_results");
    tent_glm(&results, "101");
    let masks = tmp.path().join("masks");
    std::fs::create_dir(&masks).unwrap();
    std::fs::write(masks.join("precuneus.txt"), "-4 -58 36\n").unwrap();

    let mut req = RoiRequest::new(&results, &masks);
    req.analyses = vec![sphere_timecourses()];

    let strict = run_roi_analysis(&runner("RAI"), &Toolbox::default(), &req).await;
    assert!(matches!(strict, Err(AfniPrepError::InvalidParameter(_))));
    assert!(!results.join("subj.101/101.results/GLM_tent/temp_precuneus.txt").exists());

    req.allow_orientation_mismatch = true;
    let report = run_roi_analysis(&runner("RAI"), &Toolbox::default(), &req)
        .await
        .unwrap();
    // one warning per dataset checked
    assert_eq!(report.warnings.len(), 2);
    assert!(report.warnings[0].contains("does not match dataset orientation RAI"));
    assert_eq!(report.analyses[0].averages, 2);
}
