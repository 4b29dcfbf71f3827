use afniprep_rs::bids::{convert_dicoms, create_folders, reorganize_nifti, session_paths, ReorganizeRequest};
use afniprep_rs::events::{generate_event_files, read_events, write_events, EventRow, EventsRequest};
use afniprep_rs::timing::{create_timing_files, TimingRequest};
use afniprep_rs::{AfniPrepError, Participant, RecordingRunner, StudyProfile, Tool, Toolbox};
use std::path::Path;

fn pair(dir: &Path, stem: &str, json: &str) {
    std::fs::write(dir.join(format!("{}.nii.gz", stem)), b"").unwrap();
    std::fs::write(dir.join(format!("{}.json", stem)), json).unwrap();
}

/// Stands in for dcm2niix: writes a session's worth of converted series into `-o`.
fn fake_dcm2niix() -> RecordingRunner {
    RecordingRunner::with_responder(|inv| {
        if inv.tool == Tool::Dcm2niix {
            let out = Path::new(inv.arg_after("-o").unwrap());
            pair(out, "T1w_MPR_2", "{}");
            pair(out, "ERWD_Encoding1_10", "{}");
            pair(out, "ERWD_Encoding1_11", "{}");
            pair(out, "ERWD_Retrieval1a_12", "{}");
            pair(out, "ERWD_Retrieval1a_13", "{}");
            pair(out, "SpinEchoFieldMap_AP_4", r#"{"PhaseEncodingDirection": "j-"}"#);
            pair(out, "SpinEchoFieldMap_PA_5", r#"{"PhaseEncodingDirection": "j"}"#);
            pair(out, "SpinEchoFieldMap_AP_6", r#"{"PhaseEncodingDirection": "j-"}"#);
            pair(out, "SpinEchoFieldMap_PA_7", r#"{"PhaseEncodingDirection": "j"}"#);
        }
        Ok(String::new())
    })
}

const ENCODING_HEADER: &str =
    "Filename,IndoorOutdoor,EncodingBlock,RetrievalBlock,encodingTrialResponse.keys,encodingTrialResponse.rt";
const RETRIEVAL_HEADER: &str =
    "Filename,IndoorOutdoor,EncodingBlock,RetrievalBlock,OldTrue,retrievalTrialResponse.keys,retrievalTrialResponse.rt";

/// A PsychoPy export pair: `<stem>.csv` and its `<stem>.log` with a sync pulse and scene onsets.
fn psychopy_export(raw: &Path, stem: &str, header: &str, rows: &[&str], sync: f64, scene: &str, scenes: &[f64]) {
    let mut csv = format!("{}\n", header);
    for row in rows {
        csv.push_str(row);
        csv.push('\n');
    }
    std::fs::write(raw.join(format!("{}.csv", stem)), csv).unwrap();

    let mut log = String::from("0.0010 \tEXP \tCreated window\n");
    log.push_str(&format!("{:.4} \tDATA \tKeypress: 5\n", sync));
    for t in scenes {
        log.push_str(&format!("{:.4} \tEXP \t{}: autoDraw = True\n", t, scene));
    }
    std::fs::write(raw.join(format!("{}.log", stem)), log).unwrap();
}

fn encoding1_export(raw: &Path) {
    psychopy_export(
        raw,
        "003_ERWD_Encoding1",
        ENCODING_HEADER,
        &[
            "indoor_ballroom.jpg,Indoor,1,1a,1,0.8",
            ",,,,,",
            "outdoor_dam.jpg,Outdoor,1,1b,6,0.95",
        ],
        2.0,
        "encodingScene_1",
        &[4.5, 9.25],
    );
}

fn bold(func: &Path, name: &str) {
    std::fs::write(func.join(name), b"").unwrap();
}

fn scored(onset: f64, trial_type: &str, response_type: &str, conf: &str, rt: &str) -> EventRow {
    let mut row = EventRow::blank(onset, "1.9", trial_type);
    row.participant_response_type = response_type.to_string();
    row.participant_response_type_conf = format!("{}-{}", response_type, conf);
    row.participant_response_rt = rt.to_string();
    row.filename = format!("item_{}.jpg", onset);
    row
}

#[tokio::test]
async fn test_dicoms_to_timing_files() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let participant = Participant::new("erwd", 3);

    create_folders(root, &participant, &[1]).unwrap();
    let paths = session_paths(root, &participant, Some(1));
    std::fs::write(paths.dicom().join("IM-0001.dcm"), b"").unwrap();

    let runner = fake_dcm2niix();
    convert_dicoms(&runner, &Toolbox::default(), &paths.dicom(), &paths.nifti())
        .await
        .unwrap();
    let report = reorganize_nifti(&ReorganizeRequest {
        participant: participant.clone(),
        paths: paths.clone(),
        task_code: "ERWD".to_string(),
    })
    .unwrap();

    assert_eq!(report.task_labels, vec!["encoding1", "retrieval1a"]);
    assert!(!paths.dicom().exists());
    assert!(!paths.nifti().exists());
    assert!(paths.anat().join("sub-erwd003_ses-01_T1w.nii.gz").exists());
    assert!(paths
        .func()
        .join("sub-erwd003_ses-01_task-retrieval1a_sbref.json")
        .exists());
    // two fieldmap pairs: the second pair collides with the first and stays put
    let ap = paths.fmap().join("sub-erwd003_ses-01_dir-AP_epi.json");
    assert!(paths.fmap().join("sub-erwd003_ses-01_dir-PA_epi.nii.gz").exists());
    assert!(paths.fmap().join("SpinEchoFieldMap_AP_6.nii.gz").exists());
    assert_eq!(report.warnings.len(), 3);
    let sidecar: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&ap).unwrap()).unwrap();
    assert_eq!(
        sidecar["IntendedFor"],
        serde_json::json!([
            "ses-01/func/sub-erwd003_ses-01_task-encoding1_bold.nii.gz",
            "ses-01/func/sub-erwd003_ses-01_task-retrieval1a_bold.nii.gz"
        ])
    );
    let bold: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(paths.func().join("sub-erwd003_ses-01_task-encoding1_bold.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(bold["TaskName"], "encoding1");

    // hand-coded events for the two runs
    let encoding = vec![
        {
            let mut row = EventRow::blank(10.0, "0.5", "encoding");
            row.participant_subsequent_type = "hit".to_string();
            row.participant_subsequent_type_conf = "hit-high".to_string();
            row
        },
        EventRow::blank(14.25, "0.5", "encoding"),
    ];
    let retrieval = vec![
        scored(3.0, "retrieval", "hit", "high", "0.91"),
        scored(7.12346, "retrieval", "fa", "low", "n/a"),
        scored(9.5, "retrieval", "cr", "mod", "1.2"),
    ];
    write_events(
        &paths.func().join("sub-erwd003_ses-01_task-encoding1_events.tsv"),
        &encoding,
    )
    .unwrap();
    let retrieval_path = paths.func().join("sub-erwd003_ses-01_task-retrieval1a_events.tsv");
    write_events(&retrieval_path, &retrieval).unwrap();
    assert_eq!(read_events(&retrieval_path).unwrap(), retrieval);

    let timing = create_timing_files(&TimingRequest {
        bids_root: root.to_path_buf(),
        participant: participant.clone(),
        sessions: vec![1],
        onsets_dir: None,
        study: StudyProfile::default(),
    })
    .unwrap();
    assert_eq!(timing.runs, vec!["encoding1", "retrieval1a"]);
    assert_eq!(timing.files_written, 650);

    let read = |name: &str| std::fs::read_to_string(timing.onsets_dir.join(name)).unwrap();
    assert_eq!(read("sub-erwd003_all_allruns_hit_allconf_rt.txt"), "10.0*1.1 \n3.0*0.91 \n");
    assert_eq!(read("sub-erwd003_retrieval_short1_fa_allconf_rt.txt"), "*\n7.1235*1.1 \n");
    assert_eq!(read("sub-erwd003_retrieval_allruns_hit_highconf_nort.txt"), "*\n3.0 \n");
    assert_eq!(read("sub-erwd003_all_allruns_cr_modlowconf_nort.txt"), "-1\n9.5 \n");
    assert_eq!(read("sub-erwd003_encoding_long_miss_allconf_rt.txt"), "*\n*\n");
}

#[test]
fn test_events_across_sessions_fill_subsequent_memory() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("bids");
    let raw = tmp.path().join("behavioral");
    std::fs::create_dir(&raw).unwrap();
    let participant = Participant::new("erwd", 3);
    create_folders(&root, &participant, &[1, 2]).unwrap();

    let ses1 = session_paths(&root, &participant, Some(1)).func();
    let ses2 = session_paths(&root, &participant, Some(2)).func();
    bold(&ses1, "sub-erwd003_ses-01_task-encoding1_bold.nii.gz");
    bold(&ses1, "sub-erwd003_ses-01_task-retrieval1a_bold.nii.gz");
    bold(&ses2, "sub-erwd003_ses-02_task-retrieval1b_bold.nii.gz");

    encoding1_export(&raw);
    psychopy_export(
        &raw,
        "003_ERWD_Retrieval1a",
        RETRIEVAL_HEADER,
        &[
            "indoor_ballroom.jpg,Indoor,1,1a,1,2,1.1",
            "indoor_new.jpg,Indoor,,1a,0,1,0.7",
        ],
        1.0,
        "retrievalScene_1A",
        &[3.0, 6.0],
    );
    psychopy_export(
        &raw,
        "003_ERWD_Retrieval1b",
        RETRIEVAL_HEADER,
        &["outdoor_dam.jpg,Outdoor,1,1b,1,6,1.3"],
        0.0,
        "retrievalScene_1A",
        &[4.0],
    );

    let request = |session: u32| EventsRequest {
        bids_root: root.clone(),
        raw_dir: raw.clone(),
        participant: participant.clone(),
        session: Some(session),
        session_count: 2,
        study: StudyProfile::default(),
    };
    let encoding_path = ses1.join("sub-erwd003_ses-01_task-encoding1_events.tsv");

    let first = generate_event_files(&request(1)).unwrap();
    assert_eq!(first.written.len(), 2);
    assert!(first.subsequent_updated.is_empty());
    let pending = read_events(&encoding_path).unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|r| r.participant_subsequent_type_conf == "?"));

    let retrieval = read_events(&ses1.join("sub-erwd003_ses-01_task-retrieval1a_events.tsv")).unwrap();
    assert_eq!(retrieval[0].onset, 2.0);
    assert_eq!(retrieval[0].participant_response_type_conf, "hit-mod");
    assert_eq!(retrieval[1].participant_response_type_conf, "fa-high");

    let last = generate_event_files(&request(2)).unwrap();
    assert_eq!(
        last.written,
        vec![ses2.join("sub-erwd003_ses-02_task-retrieval1b_events.tsv")]
    );
    assert_eq!(last.subsequent_updated, vec![encoding_path.clone()]);

    let encoding = read_events(&encoding_path).unwrap();
    assert_eq!(encoding.iter().map(|r| r.onset).collect::<Vec<_>>(), vec![2.5, 7.25]);
    assert_eq!(encoding[0].filename, "indoor_ballroom.jpg");
    assert_eq!(encoding[0].participant_subsequent_type_conf, "hit-mod");
    assert_eq!(encoding[0].participant_subsequent_judgment, "old");
    assert_eq!(encoding[1].filename, "outdoor_dam.jpg");
    assert_eq!(encoding[1].participant_subsequent_type_conf, "miss-high");
    assert_eq!(encoding[1].participant_subsequent_judgment, "new");
}

#[test]
fn test_missing_behavioral_csv_skips_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("bids");
    let raw = tmp.path().join("behavioral");
    std::fs::create_dir(&raw).unwrap();
    let participant = Participant::new("erwd", 3);
    create_folders(&root, &participant, &[]).unwrap();

    let func = session_paths(&root, &participant, None).func();
    bold(&func, "sub-erwd003_task-encoding1_bold.nii.gz");
    bold(&func, "sub-erwd003_task-retrieval1a_bold.nii.gz");
    encoding1_export(&raw);

    let report = generate_event_files(&EventsRequest {
        bids_root: root.clone(),
        raw_dir: raw,
        participant: participant.clone(),
        session: None,
        session_count: 1,
        study: StudyProfile::default(),
    })
    .unwrap();

    assert_eq!(report.skipped, vec!["retrieval1a"]);
    assert_eq!(report.written, vec![func.join("sub-erwd003_task-encoding1_events.tsv")]);
    // nothing to score against, so subsequent memory stays pending
    assert!(report.subsequent_updated.is_empty());
    assert!(!func.join("sub-erwd003_task-retrieval1a_events.tsv").exists());
}

#[test]
fn test_duplicate_behavioral_csv_stops_the_session() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("bids");
    let raw = tmp.path().join("behavioral");
    std::fs::create_dir(&raw).unwrap();
    let participant = Participant::new("erwd", 3);
    create_folders(&root, &participant, &[]).unwrap();

    let func = session_paths(&root, &participant, None).func();
    bold(&func, "sub-erwd003_task-encoding1_bold.nii.gz");
    encoding1_export(&raw);
    std::fs::copy(raw.join("003_ERWD_Encoding1.csv"), raw.join("003_ERWD_Encoding1_rerun.csv")).unwrap();

    let err = generate_event_files(&EventsRequest {
        bids_root: root,
        raw_dir: raw,
        participant,
        session: None,
        session_count: 1,
        study: StudyProfile::default(),
    })
    .unwrap_err();

    assert!(matches!(err, AfniPrepError::InvalidParameter(_)));
    assert!(!func.join("sub-erwd003_task-encoding1_events.tsv").exists());
}
