use std::time::Duration;

use futures_util::StreamExt;

use clausal::{BoxError, ClausalError, FieldMap, Predicate, Record, ThreadState, Value, Verdict};

fn lookup() -> Predicate {
    Predicate::leaf_async("lookup", FieldMap::identity(["id", "name"]).expect("valid"), |snapshot: Record| async move {
        tokio::time::sleep(Duration::from_millis(1)).await;
        let id = snapshot.get("id").and_then(Value::as_i64);
        match id {
            Some(1) => Ok::<_, BoxError>(Verdict::Success(snapshot.with("name", "alice"))),
            _ => Ok(Verdict::Failure),
        }
    })
}

fn set_n(n: i64) -> Predicate {
    Predicate::leaf(format!("n{}", n), FieldMap::identity(["n"]).expect("valid"), move |view| {
        view.set("n", n)?;
        Ok(true)
    })
}

#[tokio::test]
async fn async_leaf_writes_back_its_answer() {
    let mut thread = lookup().query(&Record::new().with("id", 1).with_null("name"));
    let answer = thread.run_async().await.expect("no error").expect("an answer");
    assert_eq!(answer.get("name").and_then(Value::as_str), Some("alice"));
    assert_eq!(thread.state(), ThreadState::Succeeded);
}

#[tokio::test]
async fn synchronous_run_suspends_without_side_effects() {
    let mut thread = set_n(1).and(&lookup()).query(&Record::new().with("id", 1).with_null("n"));
    let err = thread.run().unwrap_err();
    assert!(matches!(err, ClausalError::Suspended { ref predicate } if predicate == "lookup"));
    assert_eq!(thread.state(), ThreadState::Running);
    assert!(matches!(thread.run(), Err(ClausalError::Suspended { .. })));

    let answer = thread.run_async().await.expect("no error").expect("an answer");
    assert_eq!(answer.get("n"), Some(&Value::Int(1)));
    assert_eq!(answer.get("name").and_then(Value::as_str), Some("alice"));
}

#[tokio::test]
async fn async_failure_backtracks() {
    let goal = lookup().or(&set_n(7));
    let answer = goal
        .query(&Record::new().with("id", 2).with_null("n"))
        .run_async()
        .await
        .expect("no error")
        .expect("an answer");
    assert_eq!(answer.get("n"), Some(&Value::Int(7)));
    assert_eq!(answer.get("name"), None);
}

#[tokio::test]
async fn rejection_is_not_failure() {
    let broken = Predicate::leaf_async("broken", FieldMap::empty(), |_snapshot: Record| async move {
        Err::<Verdict, BoxError>("backend unavailable".into())
    });
    let mut thread = broken.or(&Predicate::succeed()).query(&Record::new());
    let err = thread.run_async().await.unwrap_err();
    assert!(matches!(err, ClausalError::Rejected { ref predicate, ref message } if predicate == "broken" && message == "backend unavailable"));
    assert_eq!(thread.state(), ThreadState::Errored);
}

#[tokio::test]
async fn undeclared_keys_in_an_async_answer_are_errors() {
    let sneaky = Predicate::leaf_async("sneaky", FieldMap::identity(["a"]).expect("valid"), |snapshot: Record| async move {
        Ok::<_, BoxError>(Verdict::Success(snapshot.with("b", 1)))
    });
    let mut thread = sneaky.query(&Record::new());
    assert!(matches!(
        thread.run_async().await,
        Err(ClausalError::UndeclaredField { .. })
    ));
}

#[tokio::test]
async fn stream_yields_every_answer() {
    let goal = Predicate::any([set_n(1), set_n(2)]).and(&Predicate::leaf_async(
        "pass",
        FieldMap::empty(),
        |_snapshot: Record| async move { Ok::<_, BoxError>(Verdict::Success(Record::new())) },
    ));
    let answers: Vec<i64> = goal
        .query(&Record::new().with_null("n"))
        .into_stream()
        .map(|answer| answer.expect("no error").get("n").and_then(Value::as_i64).expect("bound"))
        .collect()
        .await;
    assert_eq!(answers, vec![1, 2]);
}
