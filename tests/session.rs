use timetable_optimization_lib::algorithms::generator::{generate, ScenarioConfig};
use timetable_optimization_lib::config::SearchBudget;
use timetable_optimization_lib::{
    CandidateSlot, LessonGroup, Module, OptimizationRequest, OptimizeError, OptimizeSession, OptimizeState,
    OptimizerConfig,
};

fn unlimited() -> OptimizerConfig {
    OptimizerConfig {
        budget: SearchBudget::unlimited(),
        ..OptimizerConfig::default()
    }
}

#[tokio::test]
async fn second_call_while_running_is_busy() {
    let session = OptimizeSession::new(unlimited(), None);
    let heavy = generate(&ScenarioConfig::hard(), 11);
    let light = generate(&ScenarioConfig::easy(), 1);

    let (first, second) = tokio::join!(session.run(&heavy), async {
        let second = session.run(&light).await;
        session.cancel();
        second
    });

    assert_eq!(second, Err(OptimizeError::Busy));
    match &first {
        Ok(blocks) => assert_eq!(session.state(), OptimizeState::Succeeded(blocks.clone())),
        Err(err) => {
            assert!(matches!(err, OptimizeError::Cancelled | OptimizeError::Infeasible { .. }));
            assert_eq!(session.state(), OptimizeState::Failed(err.clone()));
        }
    }
}

#[tokio::test]
async fn acknowledged_session_runs_again() {
    let session = OptimizeSession::new(unlimited(), None);
    let request = OptimizationRequest::new(vec![Module::new(
        "CS1231S",
        vec![LessonGroup::new(
            "Lecture",
            vec![CandidateSlot::parse("1", "Thursday", "1200", "1400", Some("LT27")).unwrap()],
        )],
    )]);

    let first = session.run(&request).await.unwrap();
    assert!(session.state().is_finished());

    assert_eq!(session.acknowledge(), OptimizeState::Succeeded(first.clone()));
    assert_eq!(session.state(), OptimizeState::Idle);

    let again = session.run(&request).await.unwrap();
    assert_eq!(first, again);
}

#[tokio::test]
async fn invalid_input_leaves_session_failed() {
    let session = OptimizeSession::new(unlimited(), None);
    let request = OptimizationRequest::new(vec![Module::new("CS1231S", vec![LessonGroup::new("Lecture", vec![])])]);

    let err = session.run(&request).await.unwrap_err();
    assert!(matches!(err, OptimizeError::InvalidInput(_)));
    assert_eq!(session.state(), OptimizeState::Failed(err));
    assert!(!session.is_running());
}
