use std::thread::{self, JoinHandle};
use std::time::Duration;

use dlp_core::platform::Platform;
use metadata::{MetadataClient, MetadataError};
use tiny_http::{Header, Response, Server};

/// Seen request: url plus the Metadata-Flavor header value, if any.
type Seen = Option<(String, Option<String>)>;

/// One-shot fake metadata server answering a single request.
fn fake_server(status: u16, headers: &[(&str, &str)], body: &str) -> (String, JoinHandle<Seen>) {
    let server = Server::http("127.0.0.1:0").expect("bind fake metadata server");
    let addr = server.server_addr().to_ip().expect("ip listener");
    let headers: Vec<Header> = headers
        .iter()
        .map(|(k, v)| Header::from_bytes(k.as_bytes(), v.as_bytes()).unwrap())
        .collect();
    let body = body.to_string();
    let handle = thread::spawn(move || {
        let req = server.recv_timeout(Duration::from_secs(5)).ok().flatten()?;
        let flavor = req
            .headers()
            .iter()
            .find(|h| h.field.equiv("Metadata-Flavor"))
            .map(|h| h.value.as_str().to_string());
        let url = req.url().to_string();
        let mut resp = Response::from_string(body).with_status_code(status);
        for h in headers {
            resp = resp.with_header(h);
        }
        let _ = req.respond(resp);
        Some((url, flavor))
    });
    (addr.to_string(), handle)
}

#[test]
fn disabled_probe_never_touches_the_network() {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let client = MetadataClient::new(addr.to_string());

    assert_eq!(client.detect_platform(false), Platform::Other);

    let req = server.recv_timeout(Duration::from_millis(200)).unwrap();
    assert!(req.is_none(), "no request may reach the metadata server");
}

#[test]
fn google_flavor_header_means_gce() {
    let (addr, h) = fake_server(200, &[("Metadata-Flavor", "Google")], "");
    let client = MetadataClient::new(addr);
    assert_eq!(client.detect_platform(true), Platform::Gce);
    let (url, _) = h.join().unwrap().expect("probe reached server");
    assert_eq!(url, "/");
}

#[test]
fn ec2_server_header_means_ec2() {
    let (addr, h) = fake_server(200, &[("Server", "EC2ws")], "");
    assert_eq!(MetadataClient::new(addr).detect_platform(true), Platform::Ec2);
    h.join().unwrap();
}

#[test]
fn iis_error_response_means_azure() {
    let (addr, h) = fake_server(400, &[("Server", "Microsoft-IIS/10.0")], "bad request");
    assert_eq!(MetadataClient::new(addr).detect_platform(true), Platform::Azure);
    h.join().unwrap();
}

#[test]
fn iis_success_response_is_not_azure() {
    let (addr, h) = fake_server(200, &[("Server", "Microsoft-IIS/10.0")], "");
    assert_eq!(MetadataClient::new(addr).detect_platform(true), Platform::Other);
    h.join().unwrap();
}

#[test]
fn unrecognized_response_means_other() {
    let (addr, h) = fake_server(200, &[("Server", "nginx")], "hello");
    assert_eq!(MetadataClient::new(addr).detect_platform(true), Platform::Other);
    h.join().unwrap();
}

#[test]
fn unreachable_server_means_other() {
    // Bind then drop to obtain a port with nothing listening.
    let addr = {
        let server = Server::http("127.0.0.1:0").unwrap();
        server.server_addr().to_ip().unwrap()
    };
    let client = MetadataClient::with_timeout(addr.to_string(), Duration::from_millis(500));
    assert_eq!(client.detect_platform(true), Platform::Other);
}

#[test]
fn project_id_lookup_sends_flavor_header() {
    let (addr, h) = fake_server(200, &[("Metadata-Flavor", "Google")], "my-gce-project");
    let client = MetadataClient::new(addr);
    let body = client.fetch_gce_metadata(Platform::Gce, "project/project-id").unwrap();
    assert_eq!(body, "my-gce-project");

    let (url, flavor) = h.join().unwrap().expect("lookup reached server");
    assert_eq!(url, "/computeMetadata/v1/project/project-id");
    assert_eq!(flavor.as_deref(), Some("Google"));
}

#[test]
fn project_id_lookup_error_status_is_reported() {
    let (addr, h) = fake_server(404, &[], "not found");
    let err = MetadataClient::new(addr)
        .fetch_gce_metadata(Platform::Gce, "project/project-id")
        .unwrap_err();
    assert!(matches!(err, MetadataError::Status(404)));
    h.join().unwrap();
}
