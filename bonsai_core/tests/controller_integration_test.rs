// End-to-end behaviors driven through the controller with built-in skills
use bonsai_core::communication::{CoreObjects, Hub, HubActuator};
use bonsai_core::config::{BonsaiConfig, ControllerConfig};
use bonsai_core::control::{StateMachineController, StateSnapshot};
use bonsai_core::core::SkillRegistry;
use bonsai_core::memory::WorkingMemory;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

fn controller_with(objects: CoreObjects, memory: WorkingMemory) -> StateMachineController {
    StateMachineController::new(
        ControllerConfig::testing(),
        SkillRegistry::with_builtins(),
        objects,
        memory,
    )
    .unwrap()
}

fn controller() -> StateMachineController {
    controller_with(CoreObjects::new(), WorkingMemory::new())
}

fn run_to_completion(controller: &StateMachineController, xml: &str) {
    let results = controller.load(xml);
    assert!(results.success(), "{}", results);
    controller.start().unwrap();
    assert!(
        controller.wait_until_finished(TIMEOUT),
        "stuck in {:?}",
        controller.current_states()
    );
}

#[test]
fn test_skill_chain_writes_memory() {
    let memory = WorkingMemory::new();
    let controller = controller_with(CoreObjects::new(), memory.clone());

    run_to_completion(
        &controller,
        r##"<scxml initial="Wait#settle">
             <state id="Wait#settle">
               <datamodel><data id="#_TIMEOUT" expr="10"/></datamodel>
               <transition event="Wait.success" target="WriteSlot#store"/>
             </state>
             <state id="WriteSlot#store">
               <datamodel><data id="#_VALUE" expr="'hello'"/></datamodel>
               <transition event="WriteSlot.success" target="Done"/>
               <transition event="WriteSlot.error" target="Failed"/>
             </state>
             <final id="Done"/>
             <final id="Failed"/>
           </scxml>"##,
    );

    assert_eq!(controller.current_states(), vec!["Done".to_string()]);
    assert_eq!(memory.read::<String>("/Target").unwrap().as_deref(), Some("hello"));
}

#[test]
fn test_reentered_skill_state_runs_fresh_skill() {
    let memory = WorkingMemory::new();
    let controller = controller_with(CoreObjects::new(), memory.clone());

    run_to_completion(
        &controller,
        r##"<scxml initial="Counter#count">
             <datamodel>
               <data id="#_SLOTS"><slot key="Count" xpath="/counters/main"/></data>
             </datamodel>
             <state id="Counter#count">
               <datamodel><data id="#_LIMIT" expr="3"/></datamodel>
               <transition event="Counter.success.limit" target="Done"/>
               <transition event="Counter.success" target="Counter#count"/>
               <transition event="Counter.error" target="Done"/>
             </state>
             <final id="Done"/>
           </scxml>"##,
    );

    assert_eq!(memory.read::<i64>("/counters/main").unwrap(), Some(3));
    let visits = controller.state_visits().unwrap();
    assert_eq!(visits.get("Counter#count"), Some(&3));
}

#[test]
fn test_actuator_receives_commands() {
    let speech: Hub<String> = Hub::new("speech");
    let heard = speech.subscribe();
    let objects = CoreObjects::new();
    objects.add_actuator("SpeechActuator", Arc::new(HubActuator::new("speech", speech)));
    let controller = controller_with(objects, WorkingMemory::new());

    run_to_completion(
        &controller,
        r##"<scxml initial="Speak#hi">
             <state id="Speak#hi">
               <datamodel><data id="#_MESSAGE">Hello there</data></datamodel>
               <transition event="Speak.success" target="Done"/>
             </state>
             <final id="Done"/>
           </scxml>"##,
    );

    assert_eq!(heard.recv_timeout(TIMEOUT).as_deref(), Some("Hello there"));
}

#[test]
fn test_missing_actuator_fails_loading() {
    let controller = controller();
    let results = controller.load(
        r##"<scxml initial="Speak#hi">
             <state id="Speak#hi">
               <datamodel><data id="#_MESSAGE" expr="'hi'"/></datamodel>
               <transition event="Speak.success" target="Done"/>
             </state>
             <final id="Done"/>
           </scxml>"##,
    );
    assert!(!results.success());
    assert!(results.errors[0].contains("SpeechActuator"), "{}", results);
    assert!(!controller.is_loaded());
}

#[test]
fn test_failed_init_fires_fatal() {
    let controller = controller();
    run_to_completion(
        &controller,
        r#"<scxml initial="FailInit#broken">
             <state id="FailInit#broken">
               <transition event="FailInit.fatal" target="Recovered"/>
             </state>
             <final id="Recovered"/>
           </scxml>"#,
    );
    assert_eq!(controller.current_states(), vec!["Recovered".to_string()]);
}

#[test]
fn test_parallel_skills_join_on_done_event() {
    let controller = controller();
    run_to_completion(
        &controller,
        r##"<scxml initial="Both">
             <parallel id="Both">
               <state id="Left" initial="Wait#left">
                 <state id="Wait#left">
                   <datamodel><data id="#_TIMEOUT" expr="5"/></datamodel>
                   <transition event="Wait.success" target="LeftDone"/>
                 </state>
                 <final id="LeftDone"/>
               </state>
               <state id="Right" initial="Noop#right">
                 <state id="Noop#right">
                   <transition event="Noop.success" target="RightDone"/>
                 </state>
                 <final id="RightDone"/>
               </state>
               <transition event="done.state.Both" target="Done"/>
             </parallel>
             <final id="Done"/>
           </scxml>"##,
    );
    assert_eq!(controller.current_states(), vec!["Done".to_string()]);
}

#[test]
fn test_stop_cancels_long_running_skill() {
    let controller = controller();
    let results = controller.load(
        r##"<scxml initial="Wait#forever">
             <state id="Wait#forever">
               <datamodel><data id="#_TIMEOUT" expr="600000"/></datamodel>
               <transition event="Wait.success" target="Done"/>
             </state>
             <final id="Done"/>
           </scxml>"##,
    );
    assert!(results.success());
    controller.start().unwrap();
    assert!(controller.wait_for_state("Wait#forever", TIMEOUT));

    let started = Instant::now();
    controller.stop().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    let status = controller.status();
    assert!(!status.running);
    assert!(!status.finished);
}

#[test]
fn test_listeners_and_topic_see_state_changes() {
    let controller = controller();
    let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    controller.add_listener(Box::new(move |snapshot: &StateSnapshot| {
        sink.lock().push(snapshot.current_states.clone());
    }));
    let topic = controller.state_topic().subscribe();

    let results = controller.load(
        r#"<scxml initial="A">
             <state id="A"><transition event="next" target="B"/></state>
             <state id="B"><transition event="next" target="C"/></state>
             <final id="C"/>
           </scxml>"#,
    );
    assert!(results.success());
    controller.start().unwrap();
    for expected in ["A", "B"] {
        assert!(controller.wait_for_state(expected, TIMEOUT));
        std::thread::sleep(Duration::from_millis(30));
        controller.fire_event("next");
    }
    assert!(controller.wait_until_finished(TIMEOUT));
    std::thread::sleep(Duration::from_millis(50));

    let seen = seen.lock().clone();
    let states: Vec<&str> = seen
        .iter()
        .filter_map(|s| s.first().map(String::as_str))
        .collect();
    assert!(states.windows(3).any(|w| w == ["A", "B", "C"]), "{:?}", states);

    let published = topic.try_iter();
    assert_eq!(
        published.last().map(|s| s.current_states.clone()),
        Some(vec!["C".to_string()])
    );
}

#[test]
fn test_behavior_files_with_mapped_includes() {
    let dir = tempfile::tempdir().unwrap();
    let lib = dir.path().join("lib");
    std::fs::create_dir(&lib).unwrap();
    std::fs::write(
        lib.join("settle.scxml"),
        r##"<scxml initial="Wait#inner">
             <state id="Wait#inner">
               <datamodel><data id="#_TIMEOUT" expr="5"/></datamodel>
               <transition event="Wait.success" target="InnerDone"/>
             </state>
             <final id="InnerDone"/>
           </scxml>"##,
    )
    .unwrap();
    let main = dir.path().join("main.scxml");
    std::fs::write(
        &main,
        r#"<scxml initial="Settle">
             <state id="Settle" src="${LIB}/settle.scxml">
               <transition event="done.state.Settle" target="Done"/>
             </state>
             <final id="Done"/>
           </scxml>"#,
    )
    .unwrap();

    let config = BonsaiConfig::from_toml_str(&format!(
        "[controller]\npublisher_interval_ms = 5\n\n[include_mappings]\nLIB = {:?}\n",
        lib.display().to_string()
    ))
    .unwrap();
    let controller = StateMachineController::from_config(
        &config,
        SkillRegistry::with_builtins(),
        CoreObjects::new(),
        WorkingMemory::new(),
    )
    .unwrap();

    run_to_completion(&controller, main.to_str().unwrap());
    assert_eq!(controller.status().behavior.as_deref(), main.to_str());
}
