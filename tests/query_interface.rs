use std::time::Duration;

use futures_util::StreamExt;

use clausal::{
    BoxError, CancelToken, ClausalError, EngineConfig, FieldMap, Predicate, QueryInterface,
    QueryOptions, Record, ThreadState, Value, Verdict,
};

fn set_n(n: i64) -> Predicate {
    Predicate::leaf(format!("n{}", n), FieldMap::identity(["n"]).expect("valid"), move |view| {
        view.set("n", n)?;
        Ok(true)
    })
}

fn one_two_three() -> Predicate {
    Predicate::any([set_n(1), set_n(2), set_n(3)])
}

fn scope() -> Record {
    Record::new().with_null("n")
}

fn numbers(answers: Vec<clausal::Result<Record>>) -> Vec<i64> {
    answers
        .into_iter()
        .map(|answer| answer.expect("no error").get("n").and_then(Value::as_i64).expect("bound"))
        .collect()
}

#[test]
fn background_query_streams_answers() {
    let interface = QueryInterface::new(EngineConfig::default());
    let handle = interface.start_query(&one_two_three(), &scope(), QueryOptions::default());
    let answers: Vec<_> = handle.results.iter().collect();
    assert_eq!(numbers(answers), vec![1, 2, 3]);
}

#[test]
fn limit_stops_early() {
    let interface = QueryInterface::new(EngineConfig::default());
    let options = QueryOptions { limit: Some(2), ..QueryOptions::default() };
    let handle = interface.start_query(&one_two_three(), &scope(), options);
    assert_eq!(numbers(handle.join()), vec![1, 2]);
}

#[test]
fn many_queries_share_one_goal() {
    let interface = QueryInterface::new(EngineConfig::default());
    let goal = one_two_three();
    let handles: Vec<_> = (0..8)
        .map(|_| interface.start_query(&goal, &scope(), QueryOptions::default()))
        .collect();
    for handle in handles {
        assert_eq!(numbers(handle.join()), vec![1, 2, 3]);
    }
    assert_eq!(interface.active(), 0);
}

#[test]
fn run_sync_collects_answers() {
    let interface = QueryInterface::new(EngineConfig::default());
    let answers = interface
        .run_sync(&one_two_three(), &scope(), QueryOptions::default())
        .expect("no error");
    assert_eq!(answers.len(), 3);
}

#[test]
fn cancel_by_id_stops_the_worker() {
    let slow = Predicate::leaf("slow", FieldMap::empty(), |_| {
        std::thread::sleep(Duration::from_millis(50));
        Ok(true)
    });
    let interface = QueryInterface::new(EngineConfig::default());
    let handle = interface.start_query(&slow.and(&one_two_three()), &scope(), QueryOptions::default());
    assert!(interface.cancel(handle.id));
    let answers = handle.join();
    assert_eq!(answers.len(), 1);
    assert!(matches!(answers[0], Err(ClausalError::Cancelled)));
}

#[test]
fn unknown_ids_cannot_be_cancelled() {
    let interface = QueryInterface::new(EngineConfig::default());
    let handle = interface.start_query(&Predicate::succeed(), &scope(), QueryOptions::default());
    let id = handle.id;
    handle.join();
    assert!(!interface.cancel(id));
}

#[test]
fn zero_timeout_times_out() {
    let interface = QueryInterface::new(EngineConfig::default());
    let options = QueryOptions { timeout: Some(Duration::ZERO), ..QueryOptions::default() };
    let err = interface.run_sync(&one_two_three(), &scope(), options).unwrap_err();
    assert!(matches!(err, ClausalError::TimedOut));
}

#[test]
fn cancel_token_is_checked_between_steps() {
    let token = CancelToken::new();
    let trigger = token.clone();
    let cancel_now = Predicate::leaf("cancel_now", FieldMap::empty(), move |_| {
        trigger.cancel();
        Ok(true)
    });
    let goal = cancel_now.and(&one_two_three());
    let mut thread = goal.query(&scope()).with_cancel(token);
    assert!(matches!(thread.run(), Err(ClausalError::Cancelled)));
    assert_eq!(thread.state(), ThreadState::Cancelled);
    assert_eq!(thread.choice_depth(), 0);
    assert_eq!(thread.run().expect("terminal threads answer nothing"), None);
}

#[tokio::test]
async fn async_queries_stream_through_tokio() {
    let interface = QueryInterface::new(EngineConfig::default());
    let checked = Predicate::leaf_async("checked", FieldMap::identity(["n"]).expect("valid"), |snapshot: Record| async move {
        let odd = snapshot.get("n").and_then(Value::as_i64).is_some_and(|n| n % 2 == 1);
        Ok::<_, BoxError>(if odd { Verdict::Success(snapshot) } else { Verdict::Failure })
    });
    let (_id, stream) = interface.spawn_async(&one_two_three().and(&checked), &scope(), QueryOptions::default());
    let answers: Vec<_> = stream.collect().await;
    assert_eq!(numbers(answers), vec![1, 3]);
}
