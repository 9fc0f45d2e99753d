#![no_main]

use libfuzzer_sys::arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use pgsession_wire::auth::ScramClient;

#[derive(Debug)]
struct ScramInput {
    password: String,
    server_first: String,
    server_final: String,
}

impl<'a> Arbitrary<'a> for ScramInput {
    fn arbitrary(u: &mut Unstructured<'a>) -> libfuzzer_sys::arbitrary::Result<Self> {
        let password: String = u.arbitrary()?;
        let server_first: String = u.arbitrary()?;
        let server_final: String = u.arbitrary()?;
        Ok(Self {
            password,
            server_first,
            server_final,
        })
    }
}

fuzz_target!(|input: ScramInput| {
    let mut client = ScramClient::new(input.password);
    let _first = client.client_first();

    if let Ok((_, state)) = client.client_final(&input.server_first) {
        let _ = client.verify_server_final(&input.server_final, &state);
    }
});
