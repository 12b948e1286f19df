//! The HTTP surface of the labeler: decodes `AdmissionReview`s, runs the volume through label
//! resolution and mutation and answers with the resulting JSON patch.
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use k8s_openapi::api::core::v1::PersistentVolume;
use kube::{
    ResourceExt,
    core::{
        DynamicObject,
        admission::{
            AdmissionRequest, AdmissionResponse, AdmissionReview, ConvertAdmissionReviewError,
            SerializePatchError,
        },
    },
};
use pv_labeler_webhook::Webhook;
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::{field::Empty, instrument};

use crate::{
    affinity::{MergeError, mutate_persistent_volume},
    patch::{PatchError, diff},
    provider::ProviderRegistry,
    resolve::{ResolveError, resolve_volume_labels},
};

/// The HTTP path the API server sends the `AdmissionReview`s to.
pub const ADMIT_PATH: &str = "/admit";

/// The only kind of object this webhook accepts.
pub const PERSISTENT_VOLUME_KIND: &str = <PersistentVolume as k8s_openapi::Resource>::KIND;

#[derive(Debug, Snafu)]
pub enum AdmitError {
    #[snafu(display("failed to deserialize admission review"))]
    DeserializeReview { source: serde_json::Error },

    #[snafu(display("failed to convert admission review into a request"))]
    ConvertReview { source: ConvertAdmissionReviewError },

    #[snafu(display("expected a {PERSISTENT_VOLUME_KIND}, got a {kind}"))]
    UnexpectedKind { kind: String },

    #[snafu(display("admission request does not contain an object"))]
    MissingObject,

    #[snafu(display("failed to decode {PERSISTENT_VOLUME_KIND} from admission request"))]
    DeserializeVolume { source: serde_json::Error },

    #[snafu(display("failed to resolve topology labels"))]
    ResolveLabels { source: ResolveError },

    #[snafu(display("failed to apply topology labels"))]
    MutateVolume { source: MergeError },

    #[snafu(display("failed to compute JSON patch"))]
    DiffVolume { source: PatchError },

    #[snafu(display("failed to attach JSON patch to admission response"))]
    SerializePatch { source: SerializePatchError },
}

impl AdmitError {
    /// The HTTP status code the failed request is answered with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DeserializeReview { .. }
            | Self::ConvertReview { .. }
            | Self::UnexpectedKind { .. }
            | Self::MissingObject
            | Self::DeserializeVolume { .. } => StatusCode::BAD_REQUEST,
            Self::ResolveLabels { .. } | Self::MutateVolume { .. } => StatusCode::FORBIDDEN,
            Self::DiffVolume { .. } | Self::SerializePatch { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Mutating admission webhook for PersistentVolumes, labelling them with their topology.
#[derive(Clone, Debug)]
pub struct PvLabelAdmission {
    registry: Arc<ProviderRegistry>,
}

impl PvLabelAdmission {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Handles a raw `AdmissionReview` request body.
    ///
    /// Returns [`None`] if the volume does not need any topology labels, in which case the request
    /// is answered with an empty body.
    #[instrument(skip_all, fields(request.uid = Empty, volume.name = Empty))]
    pub async fn admit(
        &self,
        body: &[u8],
    ) -> Result<Option<AdmissionReview<DynamicObject>>, AdmitError> {
        let review: AdmissionReview<DynamicObject> =
            serde_json::from_slice(body).context(DeserializeReviewSnafu)?;
        let request: AdmissionRequest<DynamicObject> =
            review.try_into().context(ConvertReviewSnafu)?;

        let span = tracing::Span::current();
        span.record("request.uid", request.uid.as_str());

        ensure!(
            request.kind.kind == PERSISTENT_VOLUME_KIND,
            UnexpectedKindSnafu {
                kind: request.kind.kind.clone()
            }
        );
        let object = request.object.as_ref().context(MissingObjectSnafu)?;
        let volume = serde_json::to_value(object)
            .and_then(serde_json::from_value::<PersistentVolume>)
            .context(DeserializeVolumeSnafu)?;
        span.record("volume.name", volume.name_any());

        let labels = resolve_volume_labels(&volume, &self.registry)
            .await
            .context(ResolveLabelsSnafu)?;
        if labels.is_empty() {
            tracing::debug!("no topology labels for volume, admitting unchanged");
            return Ok(None);
        }

        let mut mutated = volume.clone();
        let outcome = mutate_persistent_volume(&mut mutated, &labels).context(MutateVolumeSnafu)?;
        let patch = diff(&volume, &mutated).context(DiffVolumeSnafu)?;

        tracing::info!(
            %outcome,
            operations = patch.0.len(),
            ?labels,
            "admitting volume with topology labels"
        );

        let response = AdmissionResponse::from(&request);
        let response = if patch.0.is_empty() {
            response
        } else {
            response.with_patch(patch).context(SerializePatchSnafu)?
        };

        Ok(Some(response.into_review()))
    }
}

impl Webhook for PvLabelAdmission {
    fn register_routes(&self, router: Router) -> Router {
        tracing::debug!(route = ADMIT_PATH, "registering route for volume labeler");
        router.route(ADMIT_PATH, post(admit_handler).with_state(self.clone()))
    }
}

async fn admit_handler(State(admission): State<PvLabelAdmission>, body: Bytes) -> Response {
    match admission.admit(&body).await {
        Ok(Some(review)) => Json(review).into_response(),
        Ok(None) => StatusCode::OK.into_response(),
        Err(error) => {
            let status = error.status_code();
            if status.is_server_error() {
                tracing::error!(
                    error = &error as &dyn std::error::Error,
                    "failed to handle admission request"
                );
            } else {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    %status,
                    "rejecting admission request"
                );
            }

            status.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(
        AdmitError::UnexpectedKind { kind: "Pod".to_owned() },
        StatusCode::BAD_REQUEST
    )]
    #[case(AdmitError::MissingObject, StatusCode::BAD_REQUEST)]
    #[case(
        AdmitError::MutateVolume {
            source: MergeError::DecodeZoneSet {
                source: crate::topology::ZoneSetError::EmptyZone { value: "__".to_owned() },
                key: crate::topology::LABEL_TOPOLOGY_ZONE.to_owned(),
            },
        },
        StatusCode::FORBIDDEN
    )]
    fn status_codes(#[case] error: AdmitError, #[case] expected: StatusCode) {
        assert_eq!(error.status_code(), expected);
    }

    #[test]
    fn display_unexpected_kind() {
        let error = AdmitError::UnexpectedKind {
            kind: "Pod".to_owned(),
        };
        assert_eq!(error.to_string(), "expected a PersistentVolume, got a Pod");
    }
}
