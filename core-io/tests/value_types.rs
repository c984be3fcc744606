use std::mem::{align_of, size_of};

use bridge_traits::ffi::{SameSite, TimerType};
use core_io::net::{HttpHeaders, Ipv6AddrBytes, NetworkCookie, SocketDescriptor};
use core_io::{ByteArrayView, DeadlineTimer};

#[test]
fn test_trivial_values_copy_freely() {
    assert_eq!(size_of::<DeadlineTimer>(), 16);
    assert_eq!(align_of::<DeadlineTimer>(), 8);
    assert_eq!(size_of::<Ipv6AddrBytes>(), 16);
    assert_eq!(size_of::<SocketDescriptor>(), size_of::<isize>());
    assert_eq!(size_of::<ByteArrayView<'static>>(), 2 * size_of::<usize>());

    let deadline = DeadlineTimer::from_msecs(5_000, TimerType::PreciseTimer);
    let copy = deadline;
    assert_eq!(copy, deadline);

    let text = String::from("borrowed");
    let view = ByteArrayView::from(text.as_str());
    let views = [view; 3];
    assert!(views.iter().all(|v| v.as_slice() == b"borrowed"));
}

#[test]
fn test_deadline_remaining_time_reads_back() {
    let deadline = DeadlineTimer::from_msecs(12_345, TimerType::PreciseTimer);
    let remaining = deadline.remaining_time();
    assert!(remaining > 12_340 && remaining < 12_350, "remaining = {remaining}");
    assert!(!deadline.has_expired());

    let forever = DeadlineTimer::forever(TimerType::CoarseTimer);
    assert!(forever.is_forever());
    assert_eq!(forever.remaining_time(), -1);
    assert!(forever > deadline);

    assert!(DeadlineTimer::default().has_expired());
}

#[test]
fn test_parse_single_cookie() {
    let cookies = NetworkCookie::parse_cookies(b"name=value; Path=/");
    assert_eq!(cookies.len(), 1);

    let cookie = &cookies[0];
    assert_eq!(cookie.name().as_slice(), b"name");
    assert_eq!(cookie.value().as_slice(), b"value");
    assert_eq!(cookie.path(), "/");
    assert_eq!(cookie.same_site_policy(), SameSite::Default);
}

#[test]
fn test_huge_max_age_is_far_future() {
    let cookies = NetworkCookie::parse_cookies(b"a=b; Max-Age=999999999999");
    assert_eq!(cookies.len(), 1);

    let year_2200_ms = 7_258_118_400_000;
    assert!(cookies[0].expiration().is_some_and(|ms| ms > year_2200_ms));
    assert!(!cookies[0].is_session_cookie());
}

#[test]
fn test_headers_keep_insertion_order() {
    let headers = HttpHeaders::from_pairs(&[
        ("Host", "example.com"),
        ("Accept", "*/*"),
        ("X-Trace", "abc"),
    ]);
    assert_eq!(headers.size(), 3);

    let names: Vec<&[u8]> = (0..headers.size())
        .map(|i| headers.name_at(i).unwrap().as_slice())
        .collect();
    let values: Vec<&[u8]> = (0..headers.size())
        .map(|i| headers.value_at(i).unwrap().as_slice())
        .collect();
    assert_eq!(names, vec![&b"host"[..], b"accept", b"x-trace"]);
    assert_eq!(values, vec![&b"example.com"[..], b"*/*", b"abc"]);
    assert!(headers.name_at(3).is_none());
}
