use qmd_digest::{fingerprint_bytes, fingerprint_reader};

fn make_data(size: usize) -> Vec<u8> {
    // Semi-realistic data: repeating pattern with some entropy
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576, 10485760])]
fn md5_slice(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| fingerprint_bytes(divan::black_box(&data)));
}

#[divan::bench(args = [1024, 8192, 65536])]
fn md5_streamed_10mib(bencher: divan::Bencher, buf_size: usize) {
    let data = make_data(10 * 1024 * 1024);
    bencher
        .counter(divan::counter::BytesCount::new(data.len()))
        .bench(|| fingerprint_reader(divan::black_box(&data[..]), buf_size));
}

fn main() {
    divan::main();
}
