use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header::CONTENT_TYPE},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use indoc::indoc;
use pv_labeler::{
    Backend, CatalogLabelProvider, ProviderRegistry, PvLabelAdmission, VolumeCatalog,
    admission::ADMIT_PATH,
};
use pv_labeler_webhook::{Webhook, WebhookServer};
use serde_json::{Value, json};
use tower::ServiceExt;

const CATALOG: &str = indoc! {"
    volumes:
      pd-1:
        topology.kubernetes.io/zone: zone2__zone1
        topology.kubernetes.io/region: region1
      pd-broken:
        topology.kubernetes.io/zone: zone1____zone2
        topology.kubernetes.io/region: region1
"};

fn router() -> Router {
    let catalog: VolumeCatalog = serde_yaml::from_str(CATALOG).expect("valid catalog");
    let registry = ProviderRegistry::new().with_provider(
        Backend::Gce,
        Arc::new(CatalogLabelProvider::new(Backend::Gce, catalog)),
    );

    let webhooks: Vec<Box<dyn Webhook>> =
        vec![Box::new(PvLabelAdmission::new(Arc::new(registry)))];
    WebhookServer::router(&webhooks)
}

fn review(kind: &str, object: Value) -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
            "kind": {"group": "", "version": "v1", "kind": kind},
            "resource": {"group": "", "version": "v1", "resource": "persistentvolumes"},
            "name": object["metadata"]["name"],
            "operation": "CREATE",
            "userInfo": {"username": "system:serviceaccount:kube-system:pv-provisioner"},
            "object": object,
            "dryRun": false
        }
    })
}

fn gce_volume(pd_name: &str, metadata: Value) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolume",
        "metadata": metadata,
        "spec": {
            "capacity": {"storage": "10Gi"},
            "accessModes": ["ReadWriteOnce"],
            "gcePersistentDisk": {"pdName": pd_name, "fsType": "ext4"}
        }
    })
}

async fn send(router: Router, body: impl Into<Body>) -> (StatusCode, Vec<u8>) {
    let request = Request::post(ADMIT_PATH)
        .header(CONTENT_TYPE, "application/json")
        .body(body.into())
        .expect("valid request");

    let response = router.oneshot(request).await.expect("infallible router");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");

    (status, body.to_vec())
}

/// Sends `review` and returns the `response` part of the answer.
async fn admit(review: &Value) -> Value {
    let (status, body) = send(router(), review.to_string()).await;
    assert_eq!(status, StatusCode::OK);

    let mut answer: Value = serde_json::from_slice(&body).expect("admission review");
    answer["response"].take()
}

/// Decodes the patch of an admission response, which is base64 encoded on the wire.
fn patch_of(response: &Value) -> json_patch::Patch {
    let patch = &response["patch"];
    let bytes = if let Some(encoded) = patch.as_str() {
        STANDARD.decode(encoded).expect("base64 patch")
    } else {
        patch
            .as_array()
            .expect("patch is either base64 or a byte array")
            .iter()
            .map(|byte| byte.as_u64().expect("patch byte") as u8)
            .collect()
    };

    serde_json::from_slice(&bytes).expect("JSON patch")
}

#[tokio::test]
async fn label_volume_from_provider() {
    let volume = gce_volume("pd-1", json!({"name": "pv-1"}));
    let response = admit(&review("PersistentVolume", volume.clone())).await;

    assert_eq!(response["uid"], "705ab4f5-6393-11e8-b7cc-42010a800002");
    assert_eq!(response["allowed"], true);
    assert_eq!(response["patchType"], "JSONPatch");

    let mut patched = volume;
    json_patch::patch(&mut patched, &patch_of(&response).0).expect("applicable patch");

    assert_eq!(
        patched["metadata"]["labels"],
        json!({
            "topology.kubernetes.io/region": "region1",
            "topology.kubernetes.io/zone": "zone2__zone1"
        })
    );
    assert_eq!(
        patched["spec"]["nodeAffinity"],
        json!({
            "required": {
                "nodeSelectorTerms": [{
                    "matchExpressions": [
                        {"key": "topology.kubernetes.io/region", "operator": "In", "values": ["region1"]},
                        {"key": "topology.kubernetes.io/zone", "operator": "In", "values": ["zone1", "zone2"]}
                    ]
                }]
            }
        })
    );
}

#[tokio::test]
async fn trust_labels_of_provisioned_volume() {
    // Unknown to the catalog, so this would be denied if the provider was asked
    let volume = gce_volume(
        "pd-unknown",
        json!({
            "name": "pv-1",
            "annotations": {"pv.kubernetes.io/provisioned-by": "pd.csi.storage.gke.io"},
            "labels": {
                "failure-domain.beta.kubernetes.io/zone": "zone3",
                "failure-domain.beta.kubernetes.io/region": "region3"
            }
        }),
    );
    let response = admit(&review("PersistentVolume", volume.clone())).await;
    assert_eq!(response["allowed"], true);

    let mut patched = volume.clone();
    json_patch::patch(&mut patched, &patch_of(&response).0).expect("applicable patch");

    assert_eq!(patched["metadata"], volume["metadata"]);
    assert_eq!(
        patched["spec"]["nodeAffinity"]["required"]["nodeSelectorTerms"][0]["matchExpressions"],
        json!([
            {"key": "failure-domain.beta.kubernetes.io/region", "operator": "In", "values": ["region3"]},
            {"key": "failure-domain.beta.kubernetes.io/zone", "operator": "In", "values": ["zone3"]}
        ])
    );
}

#[tokio::test]
async fn conflicting_affinity_only_updates_labels() {
    let mut volume = gce_volume("pd-1", json!({"name": "pv-1"}));
    volume["spec"]["nodeAffinity"] = json!({
        "required": {
            "nodeSelectorTerms": [{
                "matchExpressions": [
                    {"key": "topology.kubernetes.io/zone", "operator": "In", "values": ["zone9"]}
                ]
            }]
        }
    });
    let response = admit(&review("PersistentVolume", volume.clone())).await;

    let mut patched = volume.clone();
    json_patch::patch(&mut patched, &patch_of(&response).0).expect("applicable patch");

    assert_eq!(patched["spec"], volume["spec"]);
    assert_eq!(
        patched["metadata"]["labels"]["topology.kubernetes.io/zone"],
        "zone2__zone1"
    );
}

#[tokio::test]
async fn unrecognized_volume_source_is_admitted_with_empty_body() {
    let volume = json!({
        "apiVersion": "v1",
        "kind": "PersistentVolume",
        "metadata": {"name": "local"},
        "spec": {"hostPath": {"path": "/mnt/data"}}
    });

    let (status, body) = send(router(), review("PersistentVolume", volume).to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
}

#[tokio::test]
async fn other_backend_is_admitted_with_empty_body() {
    let volume = json!({
        "apiVersion": "v1",
        "kind": "PersistentVolume",
        "metadata": {"name": "ebs"},
        "spec": {"awsElasticBlockStore": {"volumeID": "vol-0123"}}
    });

    let (status, body) = send(router(), review("PersistentVolume", volume).to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let (status, body) = send(router(), "{not json").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.is_empty());
}

#[tokio::test]
async fn review_without_request_is_a_bad_request() {
    let review = json!({"apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview"});
    let (status, _) = send(router(), review.to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn other_kind_is_a_bad_request() {
    let pod = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "pod-1"},
        "spec": {"containers": []}
    });

    let (status, body) = send(router(), review("Pod", pod).to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.is_empty());
}

#[tokio::test]
async fn undecodable_volume_is_a_bad_request() {
    let volume = json!({
        "apiVersion": "v1",
        "kind": "PersistentVolume",
        "metadata": {"name": "pv-1"},
        "spec": "not a volume spec"
    });

    let (status, body) = send(router(), review("PersistentVolume", volume).to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.is_empty());
}

#[tokio::test]
async fn request_without_object_is_a_bad_request() {
    let mut review = review("PersistentVolume", json!({"metadata": {"name": "pv-1"}}));
    review["request"]
        .as_object_mut()
        .expect("request object")
        .remove("object");

    let (status, body) = send(router(), review.to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.is_empty());
}

#[tokio::test]
async fn provider_failure_is_forbidden() {
    let volume = gce_volume("pd-unknown", json!({"name": "pv-1"}));

    let (status, body) = send(router(), review("PersistentVolume", volume).to_string()).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.is_empty());
}

#[tokio::test]
async fn invalid_zone_set_is_forbidden() {
    let volume = gce_volume("pd-broken", json!({"name": "pv-1"}));

    let (status, _) = send(router(), review("PersistentVolume", volume).to_string()).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn identical_requests_produce_identical_patches() {
    let review = review("PersistentVolume", gce_volume("pd-1", json!({"name": "pv-1"})));

    let first = admit(&review).await;
    let second = admit(&review).await;

    assert_eq!(first["patch"], second["patch"]);
    assert_eq!(
        serde_json::to_value(patch_of(&first)).expect("serializable patch"),
        serde_json::to_value(patch_of(&second)).expect("serializable patch")
    );
}
