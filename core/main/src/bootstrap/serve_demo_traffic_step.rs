use std::collections::BTreeMap;

use worktrack_sdk::{
    async_trait::async_trait,
    framework::{bootstrap::Bootstep, TrackerResponse},
    futures::future::join_all,
    log::info,
    tokio::{self, time::sleep},
};

use crate::{
    service::demo_host::{DemoHost, DemoResponse, OUTSTANDING_PATH},
    state::bootstrap_state::BootstrapState,
};

const SERVICE_BURST: usize = 30;
const USERS: [&str; 3] = ["alice", "bob", "carol"];

/// Pushes a burst of simulated traffic through the tracker, prints the outstanding
/// view while slow work is in flight, then stops the tracker.
pub struct ServeDemoTrafficStep;

#[async_trait]
impl Bootstep<BootstrapState> for ServeDemoTrafficStep {
    fn get_name(&self) -> String {
        "ServeDemoTrafficStep".into()
    }

    async fn setup(&self, state: BootstrapState) -> TrackerResponse {
        let mut requests = vec![
            DemoHost::request("GET", "/slow", Some("alice")),
            DemoHost::request("POST", "/async", Some("bob")),
            DemoHost::request("GET", "/static/app.js", None),
        ];
        for i in 0..SERVICE_BURST {
            requests.push(DemoHost::request(
                "GET",
                &format!("/service/items/{}", i),
                Some(USERS[i % USERS.len()]),
            ));
        }

        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let host = state.host.clone();
                tokio::spawn(async move { host.handle(request).await })
            })
            .collect();

        // let the slow request settle in before looking at what is outstanding
        sleep(std::time::Duration::from_millis(100)).await;
        let view = state
            .host
            .handle(DemoHost::request("GET", OUTSTANDING_PATH, None))
            .await;
        println!("{}", view.body);

        let responses: Vec<DemoResponse> = join_all(handles)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect();
        let mut by_status: BTreeMap<u16, usize> = BTreeMap::new();
        for response in &responses {
            *by_status.entry(response.status).or_default() += 1;
        }
        info!(
            "served {} requests by status {:?}, outstanding={}",
            responses.len(),
            by_status,
            state.tracker.registry().size()
        );

        state.tracker.stop().await
    }
}
